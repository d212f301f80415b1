//! Turn log with rolling-summary compaction

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::provider::{ChatTurn, Role};

use super::tokens::estimate_tokens;

/// Compact once the log holds more turns than this
pub const MAX_TURNS_BEFORE_COMPACT: usize = 15;
/// Turns always kept verbatim after compaction
pub const KEEP_RECENT: usize = 5;

/// Label of the synthetic turn carrying the summary
pub const SUMMARY_LABEL: &str = "CONVERSATION HISTORY SUMMARY:";

pub const SUMMARIZER_SYSTEM_PROMPT: &str =
    "You are a precise conversation summarizer for code reviews.";

/// Produces a summary with a single-shot backend call
#[async_trait]
pub trait Summarizer: Send {
    async fn summarize(&mut self, system_prompt: &str, prompt: &str) -> Result<String>;
}

/// Fixed thresholds for compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionPolicy {
    pub max_turns: usize,
    pub keep_recent: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            max_turns: MAX_TURNS_BEFORE_COMPACT,
            keep_recent: KEEP_RECENT,
        }
    }
}

/// One entry of the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub estimated_tokens: usize,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            role,
            estimated_tokens: estimate_tokens(&content),
            content,
            timestamp: Utc::now(),
        }
    }
}

/// Snapshot for health reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    pub turns: usize,
    pub estimated_tokens: usize,
    pub has_summary: bool,
    pub total_reviews: usize,
}

/// Ordered turn log plus an optional rolling summary
#[derive(Debug, Clone, Default)]
pub struct ContextManager {
    turns: Vec<Turn>,
    summary: Option<String>,
    total_reviews: usize,
    policy: CompactionPolicy,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: CompactionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        let turn = Turn::new(role, content);
        debug!("Added turn: role={}, tokens≈{}", turn.role, turn.estimated_tokens);
        self.turns.push(turn);
    }

    pub fn record_review(&mut self) {
        self.total_reviews += 1;
    }

    pub fn should_compact(&self) -> bool {
        self.turns.len() > self.policy.max_turns
    }

    /// Fold all but the most recent turns into the summary.
    ///
    /// Returns `Ok(false)` when no compaction was needed. On summarizer
    /// failure the log is left exactly as it was and the error is returned.
    pub async fn compact(&mut self, summarizer: &mut dyn Summarizer) -> Result<bool> {
        if !self.should_compact() {
            return Ok(false);
        }

        let split = self.turns.len().saturating_sub(self.policy.keep_recent);
        if split == 0 {
            return Ok(false);
        }
        let prompt = summary_prompt(self.summary.as_deref(), &self.turns[..split]);

        let summary = summarizer.summarize(SUMMARIZER_SYSTEM_PROMPT, &prompt).await?;

        self.turns.drain(..split);
        self.summary = Some(summary);
        info!(
            "Compacted context: summarized {} turns, kept {}",
            split,
            self.turns.len()
        );
        Ok(true)
    }

    /// What is actually sent to a raw backend: the summary as a system turn,
    /// then the recent turns in order.
    pub fn render(&self) -> Vec<ChatTurn> {
        let mut rendered = Vec::with_capacity(self.turns.len() + 1);
        if let Some(summary) = &self.summary {
            rendered.push(ChatTurn::system(format!("{}\n{}", SUMMARY_LABEL, summary)));
        }
        rendered.extend(
            self.turns
                .iter()
                .map(|t| ChatTurn::new(t.role, t.content.clone())),
        );
        rendered
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn total_reviews(&self) -> usize {
        self.total_reviews
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn estimated_tokens(&self) -> usize {
        let summary = self.summary.as_deref().map(estimate_tokens).unwrap_or(0);
        summary + self.turns.iter().map(|t| t.estimated_tokens).sum::<usize>()
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            turns: self.turns.len(),
            estimated_tokens: self.estimated_tokens(),
            has_summary: self.summary.is_some(),
            total_reviews: self.total_reviews,
        }
    }
}

/// Prompt asking for a new summary of `old_turns`, folded with `previous`
pub fn summary_prompt(previous: Option<&str>, old_turns: &[Turn]) -> String {
    let conversation = old_turns
        .iter()
        .map(|t| {
            format!(
                "[{}] {}: {}",
                t.timestamp.to_rfc3339(),
                t.role.as_str().to_uppercase(),
                t.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Summarize this code review conversation history concisely, preserving:\n\
         1. Key issues identified\n\
         2. Patterns or rules learned\n\
         3. Important decisions made\n\
         4. Recurring themes\n\n\
         Previous summary (if any):\n{}\n\n\
         New conversation to summarize:\n{}\n\n\
         Provide a concise summary (max 500 tokens) that captures the essential context.",
        previous.unwrap_or("None"),
        conversation
    )
}
