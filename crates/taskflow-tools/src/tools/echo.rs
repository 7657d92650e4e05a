//! Echo tool: returns its input, optionally after a delay

use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::time::Duration;

pub struct EchoTool;

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return `message` (or the whole input when absent). `delay_ms` waits first."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "description": "Value to return" },
                "delay_ms": {
                    "type": "integer",
                    "description": "Milliseconds to wait before returning"
                }
            }
        })
    }

    async fn execute(&self, params: Value) -> ToolResult {
        if let Some(ms) = params["delay_ms"].as_u64() {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        match params.get("message") {
            Some(message) => ToolResult::json(message.clone()),
            None => ToolResult::json(params),
        }
    }
}
