//! Shell tool: run a command with a timeout and capture its output

use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const MAX_OUTPUT_CHARS: usize = 30000;

pub struct ShellTool {
    workspace_root: PathBuf,
    default_timeout_secs: u64,
}

impl ShellTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
            default_timeout_secs: 120,
        }
    }
}

#[async_trait::async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace. Captures stdout, stderr and \
         the exit code. A non-zero exit is reported as a tool error. \
         Set timeout in seconds (default 120, max 600)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute with `sh -c`"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 120, max 600)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let command = match params["command"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("Missing required parameter: command"),
        };

        let timeout_secs = params["timeout"]
            .as_u64()
            .unwrap_or(self.default_timeout_secs)
            .min(600);

        debug!("shell: {}", truncate(command, 80));

        // kill_on_drop: the engine's own call timeout drops this future.
        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&self.workspace_root)
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("Failed to execute: {}", e)),
            Err(_) => return ToolResult::error(format!("Command timed out after {}s", timeout_secs)),
        };

        format_output(&output)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn format_output(output: &std::process::Output) -> ToolResult {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let code = output.status.code().unwrap_or(-1);

    if !output.status.success() {
        return ToolResult::error(format!(
            "Exit code: {}\n{}\n{}",
            code,
            truncate(stdout.trim(), MAX_OUTPUT_CHARS),
            truncate(stderr.trim(), MAX_OUTPUT_CHARS)
        ));
    }

    ToolResult::json(json!({
        "exit_code": code,
        "stdout": truncate(stdout.trim(), MAX_OUTPUT_CHARS),
        "stderr": truncate(stderr.trim(), MAX_OUTPUT_CHARS),
    }))
}
