//! Builtin tool implementations.
//!
//! Each tool is a self-contained module. To add a new tool:
//! 1. Create a new file in this directory
//! 2. Implement the Tool trait
//! 3. Add `pub mod <name>;` here
//! 4. Register it in create_default_registry() in ../lib.rs

pub mod echo;
pub mod read;
pub mod remove;
pub mod shell;
pub mod write;

use serde_json::Value;
use std::path::{Path, PathBuf};

/// Absolute paths pass through; relative ones are joined onto the workspace.
pub(crate) fn resolve_path(workspace_root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        workspace_root.join(p)
    }
}

/// Read the `path` (or `file_path`) parameter.
pub(crate) fn path_param(params: &Value) -> Option<&str> {
    params
        .get("path")
        .or(params.get("file_path"))
        .and_then(|v| v.as_str())
}
