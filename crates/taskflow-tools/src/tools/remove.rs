//! Remove tool: delete a file; the usual compensation for write_file

use super::{path_param, resolve_path};
use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub struct RemoveFileTool {
    workspace_root: PathBuf,
}

impl RemoveFileTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for RemoveFileTool {
    fn name(&self) -> &str {
        "remove_file"
    }

    fn description(&self) -> &str {
        "Delete a file. A missing file is not an error, so the call is safe to repeat."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to delete"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let path = match path_param(&params) {
            Some(p) => p,
            None => return ToolResult::error("Missing required parameter: path"),
        };
        let full_path = resolve_path(&self.workspace_root, path);

        match fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!("remove_file: {}", path);
                ToolResult::json(json!({ "path": path, "removed": true }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                ToolResult::json(json!({ "path": path, "removed": false }))
            }
            Err(e) => ToolResult::error(format!("Failed to remove {}: {}", path, e)),
        }
    }
}
