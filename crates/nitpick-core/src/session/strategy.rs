//! Per-mode behavior of a session agent

use std::path::PathBuf;

use tracing::{debug, info};

use crate::hook::{format_event, should_process};
use crate::prompts::{ReviewMode, with_message_file};

use super::types::Payload;

pub const HOOK_STARTUP_MESSAGE: &str = "Nitpick session started. Watch the events and intervene when necessary. Build understanding in your head.";

pub const REVIEW_STARTUP_MESSAGE: &str = "Nitpick session started. You will receive code review requests. For each request, analyze the user's intent and the agent's changes, and give concise, actionable feedback or approval. Build understanding of the codebase over time.";

/// What differs between hook watching and direct review
pub trait AgentStrategy: Send + Sync {
    fn mode(&self) -> ReviewMode;

    /// First message sent once the backend is open
    fn startup_message(&self) -> &str;

    /// Turn a prompt template into the final system prompt
    fn prepare_system_prompt(&self, template: &str) -> String {
        template.to_string()
    }

    /// Prompt for a work item, or `None` to skip it without a backend call
    fn format_item(&self, payload: &Payload) -> Option<String>;

    /// Called with the reply of every fire-and-forget item
    fn on_result(&self, label: &str, reply: &str) {
        debug!("Reply to {}: {} chars", label, reply.len());
    }
}

/// Hook mode: watches events, intervenes through the feedback file
#[derive(Debug, Clone)]
pub struct HookWatcher {
    message_file: PathBuf,
    smart_triggers: bool,
}

impl HookWatcher {
    pub fn new(message_file: PathBuf, smart_triggers: bool) -> Self {
        Self {
            message_file,
            smart_triggers,
        }
    }

    pub fn message_file(&self) -> &PathBuf {
        &self.message_file
    }
}

impl AgentStrategy for HookWatcher {
    fn mode(&self) -> ReviewMode {
        ReviewMode::Hook
    }

    fn startup_message(&self) -> &str {
        HOOK_STARTUP_MESSAGE
    }

    fn prepare_system_prompt(&self, template: &str) -> String {
        with_message_file(template, &self.message_file)
    }

    fn format_item(&self, payload: &Payload) -> Option<String> {
        match payload {
            Payload::HookEvent(evt) => {
                should_process(evt, self.smart_triggers).then(|| format_event(evt))
            }
            Payload::Review(req) => Some(req.render()),
            Payload::Text(text) => Some(text.clone()),
        }
    }

    fn on_result(&self, label: &str, reply: &str) {
        if self.message_file.exists() {
            info!("Feedback pending at {} after {}", self.message_file.display(), label);
        } else {
            debug!("Observed {} ({} chars)", label, reply.len());
        }
    }
}

/// Review mode: every request is answered directly
#[derive(Debug, Clone, Default)]
pub struct ReviewResponder;

impl AgentStrategy for ReviewResponder {
    fn mode(&self) -> ReviewMode {
        ReviewMode::Review
    }

    fn startup_message(&self) -> &str {
        REVIEW_STARTUP_MESSAGE
    }

    fn format_item(&self, payload: &Payload) -> Option<String> {
        match payload {
            Payload::HookEvent(evt) => Some(format_event(evt)),
            Payload::Review(req) => Some(req.render()),
            Payload::Text(text) => Some(text.clone()),
        }
    }
}
