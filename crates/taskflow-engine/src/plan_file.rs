//! Loading plans from disk. YAML for `.yaml`/`.yml`, JSON otherwise.

use std::path::{Path, PathBuf};
use taskflow_core::ExecutionPlan;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanFileError {
    #[error("failed to read plan {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML plan: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON plan: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanFormat {
    Yaml,
    Json,
}

impl PlanFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

pub fn parse_plan(content: &str, format: PlanFormat) -> Result<ExecutionPlan, PlanFileError> {
    Ok(match format {
        PlanFormat::Yaml => serde_yaml::from_str(content)?,
        PlanFormat::Json => serde_json::from_str(content)?,
    })
}

pub fn load_plan(path: &Path) -> Result<ExecutionPlan, PlanFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| PlanFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_plan(&content, PlanFormat::from_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(PlanFormat::from_path(Path::new("a/plan.yml")), PlanFormat::Yaml);
        assert_eq!(PlanFormat::from_path(Path::new("plan.YAML")), PlanFormat::Json);
        assert_eq!(PlanFormat::from_path(Path::new("plan")), PlanFormat::Json);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_plan(Path::new("/nonexistent/plan.yaml")).unwrap_err();
        assert!(matches!(err, PlanFileError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/plan.yaml"));
    }

    #[test]
    fn parse_error_reports_format() {
        let err = parse_plan("id: [", PlanFormat::Yaml).unwrap_err();
        assert!(err.to_string().starts_with("invalid YAML plan"));
    }
}
