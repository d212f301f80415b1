//! Nitpick Core - session-scoped reviewer agents
//!
//! This crate provides the pieces shared by the `nitpick` binary:
//! - Session agents with FIFO work queues and a keyed registry
//! - Context management with rolling-summary compaction
//! - Reviewer backends (claude CLI, genai providers, OpenAI-compatible APIs)
//! - File tools for raw chat-completion backends
//! - Hook envelopes, review requests and file-drop feedback delivery

pub mod config;
pub mod context;
pub mod credentials;
pub mod delivery;
pub mod error;
pub mod hook;
pub mod prompts;
pub mod provider;
pub mod review;
pub mod session;
pub mod tools;

pub use config::{ReviewerConfig, log_file_path, nitpick_home};
pub use context::{CompactionPolicy, ContextManager, ContextStats, Summarizer};
pub use credentials::{CredentialResolver, Credentials};
pub use delivery::{Notification, feedback_file, notify, take_feedback};
pub use error::{Error, Result, ToolError};
pub use hook::{HookEnvelope, Platform};
pub use prompts::{PromptLoader, ReviewMode};
pub use provider::{
    BackendFactory, BackendKind, BackendRequest, BackendSession, ChatTurn, DefaultBackendFactory,
    Reply, Role, SessionOptions,
};
pub use review::ReviewRequest;
pub use session::{
    AgentConfig, AgentStrategy, HookWatcher, Payload, PendingReply, ReviewResponder,
    SessionAgent, SessionKey, SessionRegistry, SessionStats,
};
pub use tools::{FileTools, ToolDefinition};
