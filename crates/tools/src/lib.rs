//! Built-in tool implementations for Aria.
//!
//! Tools give the agent the ability to interact with the machine it runs on:
//! run shell commands, read and write files, list directories.

pub mod file_read;
pub mod file_write;
pub mod list_files;
pub mod shell;

use aria_config::ToolsConfig;
use aria_core::error::ToolError;
use aria_core::tool::{ToolParams, ToolRegistry};
use std::time::Duration;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use list_files::ListFilesTool;
pub use shell::ShellTool;

/// Create a registry with all built-in tools.
///
/// An empty `shell_allowlist` permits every command.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ShellTool::new(
        config.shell_allowlist.clone(),
        Duration::from_secs(config.shell_timeout_secs),
    )));
    registry.register(Box::new(FileReadTool));
    registry.register(Box::new(FileWriteTool));
    registry.register(Box::new(ListFilesTool));
    registry
}

pub(crate) fn required_str<'a>(params: &'a ToolParams, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

pub(crate) fn optional_str<'a>(params: &'a ToolParams, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
