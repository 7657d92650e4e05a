//! Taskflow Tools: the tool registry the engine dispatches to
//!
//! Each builtin tool is a self-contained file in src/tools/.
//! To add a tool: create the file, implement Tool trait, register below.

pub mod registry;
pub mod tools;

pub use registry::{Tool, ToolDefinition, ToolRegistry, ToolResult};

use std::path::Path;

/// Create the default tool registry with all builtin tools rooted at
/// `workspace_root`.
pub fn create_default_registry(workspace_root: impl AsRef<Path>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let root = workspace_root.as_ref();

    // --- Read-only ---
    registry.register(tools::read::ReadFileTool::new(root));
    registry.register(tools::echo::EchoTool);

    // --- Mutation tools (and their compensations) ---
    registry.register(tools::write::WriteFileTool::new(root));
    registry.register(tools::remove::RemoveFileTool::new(root));
    registry.register(tools::shell::ShellTool::new(root));

    registry
}

/// Create a registry holding only the named builtin tools.
///
/// Unknown names are logged and ignored. A tool that isn't registered can't be
/// called by any plan step.
pub fn create_policy_registry(workspace_root: impl AsRef<Path>, allowed_tools: &[&str]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let root = workspace_root.as_ref();

    for name in allowed_tools {
        match *name {
            "read_file" => registry.register(tools::read::ReadFileTool::new(root)),
            "echo" => registry.register(tools::echo::EchoTool),
            "write_file" => registry.register(tools::write::WriteFileTool::new(root)),
            "remove_file" => registry.register(tools::remove::RemoveFileTool::new(root)),
            "shell" => registry.register(tools::shell::ShellTool::new(root)),
            _ => tracing::warn!("Unknown tool in policy: {}", name),
        }
    }

    registry
}
