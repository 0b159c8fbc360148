//! Directory listing tool.

use async_trait::async_trait;
use aria_core::error::ToolError;
use aria_core::tool::{Tool, ToolParams, names};
use std::path::PathBuf;

use crate::required_str;

#[derive(Debug, Default)]
pub struct ListFilesTool;

/// Entries of one directory, sorted by name, as `(path, is_dir)`.
async fn read_sorted(dir: &PathBuf) -> std::io::Result<Vec<(PathBuf, bool)>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let is_dir = entry.file_type().await?.is_dir();
        entries.push((entry.path(), is_dir));
    }
    entries.sort();
    Ok(entries)
}

/// Depth-first walk; directories are listed before their contents.
async fn walk(root: PathBuf) -> std::io::Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut stack = vec![read_sorted(&root).await?.into_iter()];

    while let Some(level) = stack.last_mut() {
        match level.next() {
            Some((path, true)) => {
                lines.push(format!("[DIR] {}", path.display()));
                stack.push(read_sorted(&path).await?.into_iter());
            }
            Some((path, false)) => lines.push(path.display().to_string()),
            None => {
                stack.pop();
            }
        }
    }
    Ok(lines)
}

async fn list(path: &str, recursive: bool) -> std::io::Result<Vec<String>> {
    let root = PathBuf::from(path);
    if recursive {
        return walk(root).await;
    }
    Ok(read_sorted(&root)
        .await?
        .into_iter()
        .map(|(p, is_dir)| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if is_dir { format!("[DIR] {name}") } else { name }
        })
        .collect())
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        names::LIST_FILES
    }

    fn description(&self) -> &str {
        "List files and directories in a given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory path to list"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Whether to list recursively"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<String, ToolError> {
        let path = required_str(&params, "path")?;
        let recursive = params
            .get("recursive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        match list(path, recursive).await {
            Ok(lines) => Ok(lines.join("\n")),
            Err(e) => Ok(format!("Error listing files: {e}")),
        }
    }
}
