//! MCP server exposing the `review_code` tool

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{error, info};

use nitpick_core::config::log_file_path;
use nitpick_core::review::{error_feedback, request_review};
use nitpick_core::{ReviewRequest, SessionRegistry};
use nitpick_mcp::server::McpHandler;
use nitpick_mcp::{McpServer, McpTool, serve_stdio};

pub const REVIEW_TOOL: &str = "review_code";

pub struct ReviewTools {
    registry: Arc<SessionRegistry>,
    log_file: Option<PathBuf>,
}

impl ReviewTools {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            log_file: log_file_path().ok(),
        }
    }
}

fn review_tool() -> McpTool {
    McpTool {
        name: REVIEW_TOOL.to_string(),
        description: "Ask the reviewer to check completed changes against what the user asked for. \
                      Returns actionable feedback or an approval. Call it after finishing a change."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "user_instructions": {
                    "type": "string",
                    "description": "The user's original request"
                },
                "agent_plan": {
                    "type": "string",
                    "description": "The changes that were made and why"
                },
                "project_path": {
                    "type": "string",
                    "description": "Absolute path of the project"
                }
            },
            "required": ["user_instructions", "agent_plan", "project_path"]
        }),
    }
}

#[async_trait]
impl McpHandler for ReviewTools {
    async fn list_tools(&self) -> Vec<McpTool> {
        vec![review_tool()]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, String> {
        if name != REVIEW_TOOL {
            return Err(format!("Unknown tool: {}", name));
        }
        let request: ReviewRequest = serde_json::from_value(arguments)
            .map_err(|e| format!("Invalid arguments for {}: {}", REVIEW_TOOL, e))?;

        match request_review(&self.registry, request).await {
            Ok(feedback) => Ok(feedback),
            Err(e) => {
                error!("Review failed: {}", e);
                Ok(error_feedback(e, self.log_file.as_deref()))
            }
        }
    }
}

/// Serve on stdio until EOF, then stop every session agent
pub async fn run(registry: Arc<SessionRegistry>) -> anyhow::Result<()> {
    info!("Starting MCP server");
    let server = McpServer::new(Arc::new(ReviewTools::new(registry.clone())));
    let served = serve_stdio(&server).await;
    registry.shutdown_all().await;
    info!("MCP server stopped");
    served?;
    Ok(())
}
