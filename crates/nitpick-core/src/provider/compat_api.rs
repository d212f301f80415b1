//! OpenAI-compatible `/chat/completions` client with SSE streaming
//!
//! For gateways and self-hosted servers genai does not know about. Text and
//! tool-call deltas are accumulated across chunks; a chunk that does not
//! parse is skipped with a warning.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::tools::ToolDefinition;

use super::tool_loop::ChatApi;
use super::{LlmMessage, Reply, ToolInvocation};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Streaming chunk
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallChunk>>,
}

/// Partial tool call in streaming
#[derive(Debug, Deserialize)]
pub struct ToolCallChunk {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionChunk>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FunctionChunk {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Highest tool-call index accepted from a stream
pub const MAX_TOOL_CALL_INDEX: usize = 63;

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed deltas into one [`Reply`]
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    text: String,
    calls: Vec<PartialCall>,
    chunks: usize,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one SSE `data` payload. Returns false once `[DONE]` is seen.
    pub fn push_data(&mut self, data: &str) -> bool {
        if data.trim() == "[DONE]" {
            return false;
        }

        self.chunks += 1;
        let chunk: ChatChunk = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, chunk = self.chunks, "Failed to parse chunk");
                debug!(raw_data = %data, "Raw chunk data");
                return true;
            }
        };

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                self.text.push_str(&content);
            }
            for tc in choice.delta.tool_calls.unwrap_or_default() {
                if tc.index > MAX_TOOL_CALL_INDEX {
                    warn!(index = tc.index, "Skipping tool call delta with out-of-range index");
                    continue;
                }
                while self.calls.len() <= tc.index {
                    self.calls.push(PartialCall::default());
                }
                let call = &mut self.calls[tc.index];
                if let Some(id) = tc.id {
                    call.id = id;
                }
                if let Some(func) = tc.function {
                    if let Some(name) = func.name {
                        call.name = name;
                    }
                    if let Some(args) = func.arguments {
                        call.arguments.push_str(&args);
                    }
                }
            }
        }
        true
    }

    pub fn finish(self) -> Reply {
        let tool_calls = self
            .calls
            .into_iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| ToolInvocation {
                arguments: parse_arguments(&c.name, &c.arguments),
                call_id: c.id,
                name: c.name,
            })
            .collect();
        Reply {
            text: self.text,
            tool_calls,
        }
    }
}

fn parse_arguments(name: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Tool {} sent unparseable arguments: {}", name, e);
        json!({})
    })
}

/// Wire format for the request message array
pub fn to_wire_messages(system_prompt: &str, messages: &[LlmMessage]) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    wire.push(json!({ "role": "system", "content": system_prompt }));

    for msg in messages {
        wire.push(match msg {
            LlmMessage::Chat(turn) => json!({ "role": turn.role.as_str(), "content": turn.content }),
            LlmMessage::AssistantToolCalls { content, tool_calls } => json!({
                "role": "assistant",
                "content": if content.is_empty() { Value::Null } else { Value::String(content.clone()) },
                "tool_calls": tool_calls.iter().map(|tc| json!({
                    "id": tc.call_id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments.to_string()
                    }
                })).collect::<Vec<_>>()
            }),
            LlmMessage::ToolResult { call_id, content } => json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": content
            }),
        });
    }
    wire
}

pub struct CompatChat {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl CompatChat {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 4096,
        })
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body(
        &self,
        system_prompt: &str,
        messages: &[LlmMessage],
        tools: &[ToolDefinition],
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": to_wire_messages(system_prompt, messages),
            "stream": true,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        }
                    })
                })
                .collect();
        }
        body
    }
}

#[async_trait]
impl ChatApi for CompatChat {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[LlmMessage],
        tools: &[ToolDefinition],
    ) -> Result<Reply> {
        let mut request = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(system_prompt, messages, tools));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, model = %self.model, "Chat completion rejected");
            return Err(Error::Provider(format!("HTTP {}: {}", status, body)));
        }

        let mut events = response.bytes_stream().eventsource();
        let mut acc = DeltaAccumulator::new();

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if !acc.push_data(&event.data) {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, model = %self.model, "Chat completion stream error");
                    return Err(Error::Provider(format!("Stream error: {}", e)));
                }
            }
        }

        Ok(acc.finish())
    }
}
