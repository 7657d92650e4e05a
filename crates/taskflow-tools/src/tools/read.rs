//! Read tool: read a text file, optionally a window of its lines

use super::{path_param, resolve_path};
use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub struct ReadFileTool {
    workspace_root: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file. Returns its content and line count. Use offset/limit for large files."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
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

        let content = match fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read {}: {}", path, e)),
        };

        let total_lines = content.lines().count();
        let window = match (params["offset"].as_u64(), params["limit"].as_u64()) {
            (None, None) => content,
            (offset, limit) => {
                let start = (offset.unwrap_or(1) as usize).saturating_sub(1);
                let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
                content
                    .lines()
                    .skip(start)
                    .take(limit)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        debug!("read_file: {} ({} lines)", path, total_lines);
        ToolResult::json(json!({
            "path": path,
            "content": window,
            "lines": total_lines,
        }))
    }
}
