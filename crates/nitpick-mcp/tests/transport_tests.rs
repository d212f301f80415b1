//! Stdio transport tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nitpick_mcp::{serve, McpHandler, McpServer, McpTool};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Notify;

struct UpperHandler;

#[async_trait]
impl McpHandler for UpperHandler {
    async fn list_tools(&self) -> Vec<McpTool> {
        vec![McpTool {
            name: "upper".into(),
            description: "Uppercase text".into(),
            input_schema: json!({"type": "object"}),
        }]
    }

    async fn call_tool(&self, _name: &str, arguments: Value) -> Result<String, String> {
        Ok(arguments["text"].as_str().unwrap_or_default().to_uppercase())
    }
}

/// `wait` blocks until the test releases it
struct GateHandler {
    release: Arc<Notify>,
}

#[async_trait]
impl McpHandler for GateHandler {
    async fn list_tools(&self) -> Vec<McpTool> {
        Vec::new()
    }

    async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<String, String> {
        self.release.notified().await;
        Ok("released".into())
    }
}

mod transport_tests {
    use super::*;

    async fn run(input: &str) -> Vec<Value> {
        let server = McpServer::new(Arc::new(UpperHandler));
        let mut output = Vec::new();
        serve(&server, input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn by_id(responses: &[Value], id: i64) -> &Value {
        responses.iter().find(|r| r["id"] == id).unwrap()
    }

    #[tokio::test]
    async fn test_one_response_per_request() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"upper","arguments":{"text":"ok"}}}"#, "\n",
        );
        let responses = run(input).await;

        assert_eq!(responses.len(), 3);
        assert!(by_id(&responses, 1)["result"].is_object());
        assert_eq!(by_id(&responses, 2)["result"]["tools"][0]["name"], "upper");
        assert_eq!(by_id(&responses, 3)["result"]["content"][0]["text"], "OK");
    }

    #[tokio::test]
    async fn test_garbage_line_yields_parse_error_and_continues() {
        let input = "not json\n\n{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"ping\"}\n";
        let responses = run(input).await;

        assert_eq!(responses.len(), 2);
        assert!(responses.iter().any(|r| r["error"]["code"] == -32700));
        assert!(by_id(&responses, 9)["result"].is_object());
    }

    #[tokio::test]
    async fn test_slow_call_does_not_block_ping() {
        let release = Arc::new(Notify::new());
        let server = McpServer::new(Arc::new(GateHandler {
            release: release.clone(),
        }));
        let (mut client_in, server_in) = tokio::io::duplex(4096);
        let (server_out, client_out) = tokio::io::duplex(4096);

        let client = async move {
            client_in
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"wait\",\"arguments\":{}}}\n")
                .await
                .unwrap();
            client_in
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
                .await
                .unwrap();

            let mut lines = BufReader::new(client_out).lines();
            let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            assert_eq!(first["id"], 2);

            release.notify_one();
            let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            assert_eq!(second["id"], 1);
            assert_eq!(second["result"]["content"][0]["text"], "released");
            drop(client_in);
        };

        let serving = async { serve(&server, server_in, server_out).await.unwrap() };
        tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(serving, client) })
            .await
            .unwrap();
    }
}
