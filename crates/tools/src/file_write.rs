//! File write tool: create or overwrite files, creating parent directories.

use async_trait::async_trait;
use aria_core::error::ToolError;
use aria_core::tool::{Tool, ToolParams, names};
use std::path::Path;

use crate::required_str;

#[derive(Debug, Default)]
pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        names::WRITE_FILE
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it does not exist, overwrites it if it does."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<String, ToolError> {
        let path = required_str(&params, "path")?;
        let content = required_str(&params, "content")?;

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return Ok(format!("Error writing file: {e}"));
                }
            }
        }

        match tokio::fs::write(path, content).await {
            Ok(()) => Ok(format!("File written successfully: {path}")),
            Err(e) => Ok(format!("Error writing file: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(path: &Path, content: &str) -> ToolParams {
        json!({"path": path.to_str().unwrap(), "content": content})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn write_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("output.txt");

        let out = FileWriteTool
            .execute(params(&file_path, "Hello from Aria!"))
            .await
            .unwrap();
        assert!(out.starts_with("File written successfully"));
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "Hello from Aria!");
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("sub").join("dir").join("file.txt");

        FileWriteTool.execute(params(&file_path, "nested")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "nested");
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("existing.txt");
        std::fs::write(&file_path, "old content").unwrap();

        FileWriteTool.execute(params(&file_path, "new content")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "new content");
    }

    #[tokio::test]
    async fn missing_content_argument() {
        let mut p = ToolParams::new();
        p.insert("path".into(), json!("/tmp/whatever.txt"));
        let result = FileWriteTool.execute(p).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
