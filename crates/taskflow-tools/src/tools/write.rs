//! Write tool: create or overwrite a file

use super::{path_param, resolve_path};
use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub struct WriteFileTool {
    workspace_root: PathBuf,
}

impl WriteFileTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates parent directories if needed. \
         Overwrites the file if it exists. Pair with remove_file as its compensation."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let path = match path_param(&params) {
            Some(p) => p,
            None => return ToolResult::error("Missing required parameter: path"),
        };
        // Non-string content is written as its JSON text.
        let content = match &params["content"] {
            Value::String(s) => s.clone(),
            Value::Null => return ToolResult::error("Missing required parameter: content"),
            other => other.to_string(),
        };

        let full_path = resolve_path(&self.workspace_root, path);
        let existed = fs::try_exists(&full_path).await.unwrap_or(false);

        if let Some(parent) = full_path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Failed to create directories: {}", e));
            }
        }

        match fs::write(&full_path, &content).await {
            Ok(()) => {
                debug!("write_file: {} ({} bytes)", path, content.len());
                ToolResult::json(json!({
                    "path": path,
                    "bytes": content.len(),
                    "existed": existed,
                }))
            }
            Err(e) => ToolResult::error(format!("Failed to write {}: {}", path, e)),
        }
    }
}
