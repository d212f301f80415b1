//! Raw chat-completion calls through the genai client
//!
//! Covers Anthropic, OpenAI, Gemini, DeepSeek, Groq and Ollama. genai picks
//! the adapter from the model name.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use genai::chat::{
    ChatMessage, ChatOptions, ChatRequest, ChatStreamEvent, Tool, ToolCall, ToolResponse,
};
use genai::resolver::{AuthData, AuthResolver};
use genai::{Client, WebConfig};
use tracing::error;

use crate::error::{Error, Result};
use crate::tools::ToolDefinition;

use super::tool_loop::ChatApi;
use super::{BackendKind, LlmMessage, Reply, Role, ToolInvocation};

/// Default timeout for one completion request
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

fn default_web_config() -> WebConfig {
    WebConfig::default()
        .with_timeout(DEFAULT_TIMEOUT)
        .with_connect_timeout(Duration::from_secs(30))
}

pub struct GenaiChat {
    client: Client,
    kind: BackendKind,
    model: String,
    options: ChatOptions,
}

impl GenaiChat {
    pub fn new(kind: BackendKind, model: impl Into<String>, api_key: Option<String>) -> Self {
        let mut builder = Client::builder().with_web_config(default_web_config());

        if let Some(api_key) = api_key {
            let auth_resolver = AuthResolver::from_resolver_fn(
                move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                    Ok(Some(AuthData::from_single(api_key.clone())))
                },
            );
            builder = builder.with_auth_resolver(auth_resolver);
        }

        Self {
            client: builder.build(),
            kind,
            model: model.into(),
            options: ChatOptions::default(),
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.options = ChatOptions::default()
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);
        self
    }

    fn build_request(
        system_prompt: &str,
        messages: &[LlmMessage],
        tools: &[ToolDefinition],
    ) -> ChatRequest {
        let mut chat_req = ChatRequest::default().with_system(system_prompt);

        for msg in messages {
            chat_req = match msg {
                LlmMessage::Chat(turn) => chat_req.append_message(match turn.role {
                    Role::System => ChatMessage::system(&turn.content),
                    Role::User => ChatMessage::user(&turn.content),
                    Role::Assistant => ChatMessage::assistant(&turn.content),
                }),
                // Tool calls go as a single assistant message; any text
                // alongside them is dropped, as OpenAI-style APIs expect.
                LlmMessage::AssistantToolCalls { tool_calls, .. } => {
                    let calls: Vec<ToolCall> = tool_calls
                        .iter()
                        .map(|tc| ToolCall {
                            call_id: tc.call_id.clone(),
                            fn_name: tc.name.clone(),
                            fn_arguments: tc.arguments.clone(),
                            thought_signatures: None,
                        })
                        .collect();
                    chat_req.append_message(calls)
                }
                LlmMessage::ToolResult { call_id, content } => {
                    chat_req.append_message(ToolResponse::new(call_id.clone(), content.clone()))
                }
            };
        }

        if !tools.is_empty() {
            let genai_tools: Vec<Tool> = tools
                .iter()
                .map(|t| {
                    Tool::new(&t.name)
                        .with_description(&t.description)
                        .with_schema(t.parameters.clone())
                })
                .collect();
            chat_req = chat_req.with_tools(genai_tools);
        }

        chat_req
    }
}

#[async_trait]
impl ChatApi for GenaiChat {
    fn name(&self) -> &str {
        self.kind.as_str()
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
        let chat_req = Self::build_request(system_prompt, messages, tools);

        // Streaming avoids idle-connection timeouts on long generations
        let stream_response = self
            .client
            .exec_chat_stream(&self.model, chat_req, Some(&self.options))
            .await
            .map_err(|e| {
                error!(error = ?e, model = %self.model, "LLM request failed");
                Error::Provider(format!("GenAI error: {:?}", e))
            })?;

        let mut reply = Reply::default();
        let mut stream = stream_response.stream;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => reply.text.push_str(&chunk.content),
                Ok(ChatStreamEvent::ToolCallChunk(tc)) => {
                    let call = tc.tool_call;
                    reply.tool_calls.push(ToolInvocation {
                        call_id: call.call_id,
                        name: call.fn_name,
                        arguments: call.fn_arguments,
                    });
                }
                Ok(ChatStreamEvent::End(_)) => break,
                Ok(ChatStreamEvent::Start)
                | Ok(ChatStreamEvent::ReasoningChunk(_))
                | Ok(ChatStreamEvent::ThoughtSignatureChunk(_)) => {}
                Err(e) => {
                    error!(error = ?e, model = %self.model, "LLM stream error");
                    return Err(Error::Provider(format!("GenAI stream error: {:?}", e)));
                }
            }
        }

        Ok(reply)
    }
}
