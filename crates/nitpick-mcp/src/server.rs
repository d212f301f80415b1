//! MCP Server implementation

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::protocol::{methods, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::{McpTool, ServerCapabilities, ToolsCapability, PROTOCOL_VERSION};

/// Handler for MCP tool requests
#[async_trait]
pub trait McpHandler: Send + Sync {
    /// List available tools
    async fn list_tools(&self) -> Vec<McpTool>;

    /// Call a tool. `Err` is reported to the client as a tool result with
    /// `isError: true`, not as a protocol error.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, String>;
}

/// MCP Server
pub struct McpServer<H: McpHandler> {
    handler: Arc<H>,
    capabilities: ServerCapabilities,
    server_name: String,
    server_version: String,
}

impl<H: McpHandler> McpServer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_name: "nitpick".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Handle a JSON-RPC request. Notifications produce no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!("Ignoring notification: {}", request.method);
            return None;
        }

        let id = request.id;
        let response = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(id),
            methods::PING => JsonRpcResponse::success(id, json!({})),
            methods::TOOLS_LIST => self.handle_tools_list(id).await,
            methods::TOOLS_CALL => self.handle_tools_call(id, request.params).await,
            methods::INITIALIZED => return None,
            _ => JsonRpcResponse::error(id, JsonRpcError::method_not_found()),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<RequestId>) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": self.capabilities,
            "serverInfo": {
                "name": self.server_name,
                "version": self.server_version
            }
        });

        JsonRpcResponse::success(id, result)
    }

    async fn handle_tools_list(&self, id: Option<RequestId>) -> JsonRpcResponse {
        let tools = self.handler.list_tools().await;
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(
        &self,
        id: Option<RequestId>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let params = match params {
            Some(p) => p,
            None => return JsonRpcResponse::error(id, JsonRpcError::invalid_params()),
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return JsonRpcResponse::error(id, JsonRpcError::invalid_params()),
        };

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        let (text, is_error) = match self.handler.call_tool(name, arguments).await {
            Ok(text) => (text, false),
            Err(e) => (e, true),
        };

        JsonRpcResponse::success(
            id,
            json!({
                "content": [{ "type": "text", "text": text }],
                "isError": is_error
            }),
        )
    }
}
