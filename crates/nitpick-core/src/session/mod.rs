//! Session agents and their registry
//!
//! A [`SessionAgent`] is one reviewer conversation, keyed by project and
//! optionally by host session. Work reaches it through a FIFO queue, either
//! fire-and-forget (hook events) or request/reply (reviews). The
//! [`SessionRegistry`] guarantees a single running agent per key.

pub mod agent;
pub mod registry;
pub mod strategy;
pub mod types;

pub use agent::{AgentConfig, PendingReply, SessionAgent};
pub use registry::SessionRegistry;
pub use strategy::{AgentStrategy, HookWatcher, ReviewResponder};
pub use types::{Payload, ReplySender, SessionKey, SessionStats, WorkItem};
