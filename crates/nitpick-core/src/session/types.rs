//! Types shared by session agents and the registry

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::hook::HookEnvelope;
use crate::review::ReviewRequest;

/// Registry key: a project, optionally narrowed to one host session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub project: PathBuf,
    pub session_id: Option<String>,
}

impl SessionKey {
    pub fn project(project: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            session_id: None,
        }
    }

    pub fn session(project: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            session_id: Some(session_id.into()),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.session_id {
            Some(id) => write!(f, "{}#{}", self.project.display(), id),
            None => write!(f, "{}", self.project.display()),
        }
    }
}

/// Content of a work item
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    HookEvent(HookEnvelope),
    Review(ReviewRequest),
    /// Pre-rendered prompt
    Text(String),
}

impl Payload {
    pub fn is_review(&self) -> bool {
        matches!(self, Payload::Review(_))
    }

    /// Short label for logs
    pub fn label(&self) -> &str {
        match self {
            Payload::HookEvent(evt) => &evt.event,
            Payload::Review(_) => "review",
            Payload::Text(_) => "text",
        }
    }
}

/// Resolved exactly once by the consumer loop
pub type ReplySender = oneshot::Sender<Result<String>>;

/// One unit of work queued on a session agent
#[derive(Debug)]
pub enum WorkItem {
    FireAndForget(Payload),
    RequestReply(Payload, ReplySender),
}

impl WorkItem {
    pub fn payload(&self) -> &Payload {
        match self {
            WorkItem::FireAndForget(payload) | WorkItem::RequestReply(payload, _) => payload,
        }
    }

    pub fn into_parts(self) -> (Payload, Option<ReplySender>) {
        match self {
            WorkItem::FireAndForget(payload) => (payload, None),
            WorkItem::RequestReply(payload, reply) => (payload, Some(reply)),
        }
    }
}

/// Published by the consumer loop after every item
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub running: bool,
    pub reviews: usize,
    pub turns: usize,
    pub has_summary: bool,
    /// Queued plus in flight
    pub pending: usize,
    #[serde(skip)]
    pub last_activity: Instant,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            running: false,
            reviews: 0,
            turns: 0,
            has_summary: false,
            pending: 0,
            last_activity: Instant::now(),
        }
    }
}
