//! Line-delimited JSON-RPC transport

use std::io;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::{McpHandler, McpServer};

/// Serve requests read line by line from `reader`, writing one response
/// line per request to `writer`. Returns when the reader hits EOF and every
/// request already read has been answered.
///
/// Requests run concurrently, so a slow tool call does not hold up `ping`
/// or other calls. Responses are written as they complete and matched to
/// requests by id.
pub async fn serve<H, R, W>(server: &McpServer<H>, reader: R, mut writer: W) -> io::Result<()>
where
    H: McpHandler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut in_flight = FuturesUnordered::new();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                let Some(line) = line? else {
                    debug!("MCP input closed");
                    input_open = false;
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonRpcRequest>(line) {
                    Ok(request) => {
                        debug!("MCP request: {}", request.method);
                        in_flight.push(server.handle_request(request));
                    }
                    Err(e) => {
                        warn!("Failed to parse MCP request: {}", e);
                        let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                        write_response(&mut writer, &response).await?;
                    }
                }
            }
            Some(response) = in_flight.next(), if !in_flight.is_empty() => {
                if let Some(response) = response {
                    write_response(&mut writer, &response).await?;
                }
            }
            else => break,
        }
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> io::Result<()> {
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Serve on the process's own stdin/stdout
pub async fn serve_stdio<H: McpHandler>(server: &McpServer<H>) -> io::Result<()> {
    serve(server, tokio::io::stdin(), tokio::io::stdout()).await
}
