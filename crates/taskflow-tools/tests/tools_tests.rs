//! Tests for taskflow-tools: ToolResult, ToolRegistry, and the builtin tools against a real filesystem

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use taskflow_tools::*;
use tempfile::TempDir;

fn workspace() -> TempDir {
    tempfile::tempdir().unwrap()
}

struct Toggle {
    enabled: AtomicBool,
}

#[async_trait::async_trait]
impl Tool for Toggle {
    fn name(&self) -> &str {
        "toggle"
    }
    fn description(&self) -> &str {
        "can be switched off"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
    async fn execute(&self, _params: Value) -> ToolResult {
        ToolResult::text("on")
    }
}

// ===========================================================================
// ToolResult
// ===========================================================================

#[test]
fn tool_result_text_into_output() {
    let r = ToolResult::text("hello");
    assert!(!r.is_error());
    assert_eq!(r.into_output(), Ok(json!("hello")));
}

#[test]
fn tool_result_error_into_output() {
    let r = ToolResult::error("boom");
    assert!(r.is_error());
    assert_eq!(r.to_content_string(), "Error: boom");
    assert_eq!(r.into_output(), Err("boom".to_string()));
}

#[test]
fn tool_result_json_content_string() {
    let r = ToolResult::json(json!({"key": "value"}));
    let s = r.to_content_string();
    assert!(s.contains("key"));
    assert_eq!(r.into_output(), Ok(json!({"key": "value"})));
}

// ===========================================================================
// ToolRegistry
// ===========================================================================

#[tokio::test]
async fn registry_new_is_empty() {
    let reg = ToolRegistry::new();
    assert!(reg.list().is_empty());
    assert!(reg.definitions().is_empty());
}

#[tokio::test]
async fn registry_execute_missing_tool() {
    let reg = ToolRegistry::new();
    let result = reg.execute("nonexistent", json!({})).await;
    assert!(result.to_content_string().contains("not found"));
}

#[tokio::test]
async fn default_registry_has_all_tools() {
    let ws = workspace();
    let reg = create_default_registry(ws.path());
    assert_eq!(
        reg.list(),
        vec!["echo", "read_file", "remove_file", "shell", "write_file"]
    );
    assert_eq!(reg.list_read_only(), vec!["echo", "read_file"]);
    for def in reg.definitions() {
        assert!(!def.description.is_empty());
        assert!(def.input_schema.is_object());
    }
}

#[tokio::test]
async fn policy_registry_ignores_unknown_names() {
    let ws = workspace();
    let reg = create_policy_registry(ws.path(), &["echo", "nope"]);
    assert_eq!(reg.list(), vec!["echo"]);
}

#[tokio::test]
async fn disabled_tool_is_invisible() {
    let toggle = Arc::new(Toggle {
        enabled: AtomicBool::new(true),
    });
    let mut reg = ToolRegistry::new();
    reg.register_arc(toggle.clone());
    assert!(reg.contains("toggle"));

    toggle.enabled.store(false, Ordering::SeqCst);
    assert!(reg.get("toggle").is_none());
    assert!(reg.definitions().is_empty());
    let result = reg.execute("toggle", json!({})).await;
    assert!(result.to_content_string().contains("disabled"));
}

#[tokio::test]
async fn registry_remove() {
    let mut reg = ToolRegistry::new();
    reg.register(tools::echo::EchoTool);
    assert!(reg.remove("echo"));
    assert!(!reg.remove("echo"));
}

// ===========================================================================
// echo
// ===========================================================================

#[tokio::test]
async fn echo_returns_message() {
    let reg = create_policy_registry(".", &["echo"]);
    let out = reg.execute("echo", json!({"message": [1, 2]})).await;
    assert_eq!(out, ToolResult::Json(json!([1, 2])));
}

#[tokio::test]
async fn echo_without_message_returns_input() {
    let reg = create_policy_registry(".", &["echo"]);
    let out = reg.execute("echo", json!({"a": 1})).await;
    assert_eq!(out, ToolResult::Json(json!({"a": 1})));
}

// ===========================================================================
// write_file / read_file / remove_file
// ===========================================================================

#[tokio::test]
async fn write_creates_file_and_subdirectories() {
    let ws = workspace();
    let reg = create_default_registry(ws.path());
    let out = reg
        .execute("write_file", json!({"path": "a/b/c.txt", "content": "hello"}))
        .await
        .into_output()
        .unwrap();
    assert_eq!(out["bytes"], 5);
    assert_eq!(out["existed"], false);
    assert_eq!(std::fs::read_to_string(ws.path().join("a/b/c.txt")).unwrap(), "hello");
}

#[tokio::test]
async fn write_reports_overwrite() {
    let ws = workspace();
    std::fs::write(ws.path().join("x.txt"), "old").unwrap();
    let reg = create_default_registry(ws.path());
    let out = reg
        .execute("write_file", json!({"file_path": "x.txt", "content": "new"}))
        .await
        .into_output()
        .unwrap();
    assert_eq!(out["existed"], true);
}

#[tokio::test]
async fn write_serializes_non_string_content() {
    let ws = workspace();
    let reg = create_default_registry(ws.path());
    reg.execute("write_file", json!({"path": "n.json", "content": {"k": 1}}))
        .await;
    assert_eq!(std::fs::read_to_string(ws.path().join("n.json")).unwrap(), r#"{"k":1}"#);
}

#[tokio::test]
async fn write_missing_params() {
    let ws = workspace();
    let reg = create_default_registry(ws.path());
    assert!(reg.execute("write_file", json!({"content": "x"})).await.is_error());
    assert!(reg.execute("write_file", json!({"path": "x"})).await.is_error());
}

#[tokio::test]
async fn read_with_offset_and_limit() {
    let ws = workspace();
    std::fs::write(ws.path().join("lines.txt"), "one\ntwo\nthree\nfour").unwrap();
    let reg = create_default_registry(ws.path());

    let out = reg
        .execute("read_file", json!({"path": "lines.txt", "offset": 2, "limit": 2}))
        .await
        .into_output()
        .unwrap();
    assert_eq!(out["content"], "two\nthree");
    assert_eq!(out["lines"], 4);
}

#[tokio::test]
async fn read_missing_file_is_error() {
    let ws = workspace();
    let reg = create_default_registry(ws.path());
    let result = reg.execute("read_file", json!({"path": "nope.txt"})).await;
    assert!(result.is_error());
}

#[tokio::test]
async fn remove_is_repeatable() {
    let ws = workspace();
    std::fs::write(ws.path().join("gone.txt"), "bye").unwrap();
    let reg = create_default_registry(ws.path());

    let first = reg.execute("remove_file", json!({"path": "gone.txt"})).await;
    assert_eq!(first.into_output().unwrap()["removed"], true);
    assert!(!ws.path().join("gone.txt").exists());

    let second = reg.execute("remove_file", json!({"path": "gone.txt"})).await;
    assert_eq!(second.into_output().unwrap()["removed"], false);
}

// ===========================================================================
// shell
// ===========================================================================

#[tokio::test]
async fn shell_captures_stdout() {
    let ws = workspace();
    let reg = create_default_registry(ws.path());
    let out = reg
        .execute("shell", json!({"command": "echo hi; echo warn >&2"}))
        .await
        .into_output()
        .unwrap();
    assert_eq!(out["exit_code"], 0);
    assert_eq!(out["stdout"], "hi");
    assert_eq!(out["stderr"], "warn");
}

#[tokio::test]
async fn shell_runs_in_workspace() {
    let ws = workspace();
    std::fs::write(ws.path().join("marker"), "").unwrap();
    let reg = create_default_registry(ws.path());
    let out = reg
        .execute("shell", json!({"command": "ls"}))
        .await
        .into_output()
        .unwrap();
    assert!(out["stdout"].as_str().unwrap().contains("marker"));
}

#[tokio::test]
async fn shell_non_zero_exit_is_error() {
    let ws = workspace();
    let reg = create_default_registry(ws.path());
    let result = reg.execute("shell", json!({"command": "exit 3"})).await;
    assert!(result.is_error());
    assert!(result.to_content_string().contains("Exit code: 3"));
}

#[tokio::test]
async fn shell_timeout() {
    let ws = workspace();
    let reg = create_default_registry(ws.path());
    let result = reg
        .execute("shell", json!({"command": "sleep 5", "timeout": 1}))
        .await;
    assert!(result.to_content_string().contains("timed out"));
}
