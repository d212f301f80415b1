//! Token estimation
//!
//! A fixed heuristic of ~4 characters per token. Only boundedness matters
//! here, so no tokenizer is involved.

/// Characters per token
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text`
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}
