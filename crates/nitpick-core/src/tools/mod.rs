//! File tools for raw chat-completion backends
//!
//! The model may call `read_file` and `write_file`. Paths resolve against
//! the session's project directory. Every failure is turned into an error
//! string for the model; nothing here can fail the conversation.

pub mod path_utils;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::provider::ToolInvocation;

pub use path_utils::{normalize_path, resolve_in_project};

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";

/// Tool definition for LLM consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Schemas for the two file tools
pub fn file_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: READ_FILE.to_string(),
            description: "Read contents of a file".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file to read (relative to the project)"
                    }
                },
                "required": ["file_path"]
            }),
        },
        ToolDefinition {
            name: WRITE_FILE.to_string(),
            description: "Write content to a file".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file to write (relative to the project)"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file"
                    }
                },
                "required": ["file_path", "content"]
            }),
        },
    ]
}

/// Executes file tool calls inside one project directory
#[derive(Debug, Clone)]
pub struct FileTools {
    project_dir: PathBuf,
}

impl FileTools {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Run one tool call and render the outcome as text for the model
    pub async fn execute(&self, call: &ToolInvocation) -> String {
        debug!("Executing tool {} ({})", call.name, call.call_id);

        let (result, verb) = match call.name.as_str() {
            READ_FILE => (self.read(&call.arguments).await, "reading"),
            WRITE_FILE => (self.write(&call.arguments).await, "writing"),
            other => return format!("Unknown tool: {}", other),
        };

        result.unwrap_or_else(|e| {
            warn!("Tool {} failed: {}", call.name, e);
            format!("Error {} file: {}", verb, e)
        })
    }

    async fn read(&self, args: &Value) -> Result<String, ToolError> {
        let path = resolve_in_project(&self.project_dir, required_str(args, "file_path")?)?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    async fn write(&self, args: &Value) -> Result<String, ToolError> {
        let file_path = required_str(args, "file_path")?;
        let content = args["content"].as_str().unwrap_or_default();
        let path = resolve_in_project(&self.project_dir, file_path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(format!("Successfully wrote to {}", file_path))
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidParams(format!("{} is required", key)))
}
