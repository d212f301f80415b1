//! Context management for reviewer sessions
//!
//! Keeps the running conversation bounded: once the turn log grows past a
//! threshold, older turns are folded into a rolling summary.

pub mod manager;
pub mod tokens;

pub use manager::{
    summary_prompt, CompactionPolicy, ContextManager, ContextStats, Summarizer, Turn,
    KEEP_RECENT, MAX_TURNS_BEFORE_COMPACT, SUMMARIZER_SYSTEM_PROMPT, SUMMARY_LABEL,
};
pub use tokens::estimate_tokens;
