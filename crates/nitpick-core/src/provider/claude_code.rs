//! Native backend: a long-lived `claude` CLI process in stream-json mode
//!
//! The CLI keeps the conversation and runs the Read/Write tools itself, so
//! this side only writes one user line per query and reads stdout lines
//! until the turn's `result` line.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hook::SKIP_FORWARD_ENV;

use super::{BackendRequest, BackendSession, Reply, SessionOptions, ToolInvocation};

/// Overrides the `claude` executable
pub const CLAUDE_BIN_ENV: &str = "NITPICK_CLAUDE_BIN";
const ALLOWED_TOOLS: &str = "Read,Write";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One line of `claude --output-format stream-json`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamLine {
    System {
        #[serde(default)]
        subtype: Option<String>,
    },
    Assistant {
        message: AssistantMessage,
    },
    User {},
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    /// Either a plain string or an array of content blocks
    #[serde(default)]
    pub content: Value,
}

impl AssistantMessage {
    /// Normalize into a reply fragment. Tool uses are reported for logging
    /// only; the CLI has already executed them.
    pub fn into_reply(self) -> Reply {
        match self.content {
            Value::String(text) => Reply::text(text),
            Value::Array(blocks) => {
                let mut reply = Reply::default();
                for block in blocks {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(text) = block.get("text").and_then(Value::as_str) {
                                reply.text.push_str(text);
                            }
                        }
                        Some("tool_use") => reply.tool_calls.push(ToolInvocation {
                            call_id: block["id"].as_str().unwrap_or_default().to_string(),
                            name: block["name"].as_str().unwrap_or_default().to_string(),
                            arguments: block.get("input").cloned().unwrap_or(Value::Null),
                        }),
                        _ => {}
                    }
                }
                reply
            }
            _ => Reply::default(),
        }
    }
}

/// Parse one stdout line; malformed lines are logged and skipped
pub fn parse_stream_line(line: &str) -> Option<StreamLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(line = %line, error = %e, "Failed to parse stream-json line");
            None
        }
    }
}

/// Encode a prompt as a stream-json user message
pub fn user_message_line(prompt: &str) -> String {
    let msg = json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{ "type": "text", "text": prompt }]
        }
    });
    format!("{}\n", msg)
}

struct ClaudeProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
}

/// Backend session backed by one `claude` child process
pub struct ClaudeCodeSession {
    options: SessionOptions,
    binary: String,
    api_key: Option<String>,
    process: Option<ClaudeProcess>,
}

impl ClaudeCodeSession {
    pub fn new(options: SessionOptions, api_key: Option<String>) -> Self {
        let binary = std::env::var(CLAUDE_BIN_ENV).unwrap_or_else(|_| "claude".to_string());
        Self {
            options,
            binary,
            api_key,
            process: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&self.options.project_dir)
            .env(SKIP_FORWARD_ENV, "1")
            .kill_on_drop(true);
        if let Some(key) = &self.api_key {
            cmd.env("ANTHROPIC_API_KEY", key);
        }
        cmd
    }

    fn process_mut(&mut self) -> Result<&mut ClaudeProcess> {
        self.process
            .as_mut()
            .ok_or_else(|| Error::Provider("claude session is not open".to_string()))
    }
}

#[async_trait]
impl BackendSession for ClaudeCodeSession {
    async fn open(&mut self) -> Result<()> {
        if self.process.is_some() {
            return Ok(());
        }

        info!(
            project = %self.options.project_dir.display(),
            model = %self.options.model,
            "Spawning claude session"
        );

        let mut cmd = self.base_command();
        cmd.arg("--print")
            .arg("--verbose")
            .arg("--input-format")
            .arg("stream-json")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--model")
            .arg(&self.options.model)
            .arg("--system-prompt")
            .arg(&self.options.system_prompt)
            .arg("--allowed-tools")
            .arg(ALLOWED_TOOLS)
            .arg("--permission-mode")
            .arg("acceptEdits")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| {
            Error::Provider(format!(
                "Failed to spawn '{}': {}. Install the claude CLI or set {}",
                self.binary, e, CLAUDE_BIN_ENV
            ))
        })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Provider("Failed to capture claude stdout".to_string()))?;

        self.process = Some(ClaudeProcess {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        });
        Ok(())
    }

    async fn query(&mut self, request: BackendRequest) -> Result<()> {
        let process = self.process_mut()?;
        let stdin = process
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Provider("claude stdin not available".to_string()))?;

        stdin.write_all(user_message_line(&request.prompt).as_bytes()).await?;
        stdin.flush().await?;
        debug!("Sent prompt to claude ({} chars)", request.prompt.len());
        Ok(())
    }

    fn receive_response(&mut self) -> BoxStream<'_, Result<Reply>> {
        let process = match self.process_mut() {
            Ok(p) => p,
            Err(e) => return stream::once(async move { Err::<Reply, Error>(e) }).boxed(),
        };

        stream::unfold(Some(process), |state| async move {
            let process = state?;
            loop {
                let line = match process.lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        let err = Error::Provider("claude process exited mid-response".into());
                        return Some((Err(err), None));
                    }
                    Err(e) => return Some((Err(e.into()), None)),
                };

                match parse_stream_line(&line) {
                    Some(StreamLine::Assistant { message }) => {
                        return Some((Ok(message.into_reply()), Some(process)));
                    }
                    Some(StreamLine::Result {
                        is_error: true,
                        result,
                        subtype,
                    }) => {
                        let detail = result.or(subtype).unwrap_or_default();
                        let err = Error::Provider(format!("claude reported an error: {}", detail));
                        return Some((Err(err), None));
                    }
                    Some(StreamLine::Result { .. }) => return None,
                    Some(StreamLine::System { subtype }) => {
                        debug!("claude system event: {:?}", subtype);
                    }
                    Some(StreamLine::User {}) | Some(StreamLine::Other) | None => {}
                }
            }
        })
        .boxed()
    }

    async fn single_shot(&mut self, system_prompt: &str, prompt: &str) -> Result<String> {
        let output = self
            .base_command()
            .arg("--print")
            .arg("--output-format")
            .arg("text")
            .arg("--model")
            .arg(&self.options.model)
            .arg("--system-prompt")
            .arg(system_prompt)
            .arg(prompt)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Provider(format!("Failed to run '{}': {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(Error::Provider(format!(
                "claude exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        // Closing stdin asks the CLI to finish
        drop(process.stdin.take());
        match tokio::time::timeout(SHUTDOWN_GRACE, process.child.wait()).await {
            Ok(status) => debug!("claude exited: {:?}", status),
            Err(_) => {
                warn!("claude did not exit within {:?}, killing", SHUTDOWN_GRACE);
                process.child.kill().await?;
            }
        }
        Ok(())
    }

    fn keeps_own_history(&self) -> bool {
        true
    }
}
