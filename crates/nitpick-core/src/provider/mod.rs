//! Backend abstraction
//!
//! Every reviewer backend is driven through [`BackendSession`]. Provider
//! specific shapes (stream-json lines from the claude CLI, genai stream
//! events, OpenAI-compatible SSE chunks) are normalized into [`Reply`]
//! before anything leaves this module.
//!
//! Two shapes exist:
//! - native tool-capable ([`claude_code`]): the remote side runs file tools
//!   and keeps its own conversation; we only forward prompts.
//! - raw chat completion ([`tool_loop`] over [`genai_api`] or
//!   [`compat_api`]): we send the whole message array each time, declare the
//!   file tools, execute them locally and loop until a text-only turn.

pub mod catalog;
pub mod claude_code;
pub mod compat_api;
pub mod factory;
pub mod genai_api;
pub mod logging;
pub mod tool_loop;

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use catalog::{resolve_model, BackendKind};
pub use factory::DefaultBackendFactory;
pub use tool_loop::{ChatApi, RawChatSession, TOOL_TRACE_HEADER};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plain role/content pair as transmitted to a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Normalized backend reply: plain text plus any tool calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolInvocation) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Message in a raw chat-completion conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmMessage {
    /// Regular chat message (user, assistant, system)
    Chat(ChatTurn),
    /// Assistant message with tool calls
    AssistantToolCalls {
        content: String,
        tool_calls: Vec<ToolInvocation>,
    },
    /// Result of one tool call, fed back to the model
    ToolResult { call_id: String, content: String },
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::Chat(ChatTurn::user(content))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Chat(ChatTurn::assistant(content))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::Chat(ChatTurn::system(content))
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
        }
    }
}

impl From<ChatTurn> for LlmMessage {
    fn from(turn: ChatTurn) -> Self {
        Self::Chat(turn)
    }
}

/// One query to a backend.
///
/// `history` is the rendered conversation ending with the new prompt; native
/// backends ignore it and send only `prompt`.
#[derive(Debug, Clone, Default)]
pub struct BackendRequest {
    pub history: Vec<ChatTurn>,
    pub prompt: String,
}

impl BackendRequest {
    pub fn prompt_only(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        Self {
            history: vec![ChatTurn::user(prompt.clone())],
            prompt,
        }
    }
}

/// Everything a backend needs to open a session for one agent
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub kind: BackendKind,
    pub model: String,
    pub system_prompt: String,
    /// Working directory for file tools
    pub project_dir: PathBuf,
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_tool_iterations: usize,
}

/// Per-agent backend connection. Owned by exactly one session agent.
#[async_trait]
pub trait BackendSession: Send {
    /// Acquire the connection (spawn a process, warm a client...)
    async fn open(&mut self) -> Result<()>;

    /// Send a prompt. The reply is read with [`receive_response`](Self::receive_response).
    async fn query(&mut self, request: BackendRequest) -> Result<()>;

    /// Lazily yield reply fragments for the last query until the backend
    /// reports the turn complete.
    fn receive_response(&mut self) -> BoxStream<'_, Result<Reply>>;

    /// One-off completion outside the conversation (used for summaries)
    async fn single_shot(&mut self, system_prompt: &str, prompt: &str) -> Result<String>;

    /// Release the connection
    async fn close(&mut self) -> Result<()>;

    /// True when the backend remembers earlier turns itself
    fn keeps_own_history(&self) -> bool {
        false
    }
}

/// Builds backend sessions. Credentials are resolved here so a missing key
/// fails before an agent ever starts.
pub trait BackendFactory: Send + Sync {
    fn create(&self, options: &SessionOptions) -> Result<Box<dyn BackendSession>>;
}

/// Query and concatenate every text fragment of the reply
pub async fn query_text(
    session: &mut (dyn BackendSession + '_),
    request: BackendRequest,
) -> Result<String> {
    session.query(request).await?;

    let mut text = String::new();
    let mut stream = session.receive_response();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?.text);
    }
    Ok(text)
}
