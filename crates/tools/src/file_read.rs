//! File read tool.

use async_trait::async_trait;
use aria_core::error::ToolError;
use aria_core::tool::{Tool, ToolParams, names};

use crate::required_str;

#[derive(Debug, Default)]
pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        names::READ_FILE
    }

    fn description(&self) -> &str {
        "Read the contents of a file from the filesystem."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<String, ToolError> {
        let path = required_str(&params, "path")?;

        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) => Ok(format!("Error reading file: {e}")),
        }
    }
}
