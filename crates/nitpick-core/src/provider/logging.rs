//! Backend request/response trace log
//!
//! Set `NITPICK_LLM_LOG` to a file path to append one JSON line per backend
//! exchange.
//!
//! Example: `NITPICK_LLM_LOG=/tmp/nitpick-llm.jsonl nitpick server`

use std::io::Write;
use std::path::Path;

use serde_json::json;
use tracing::{debug, warn};

use super::{LlmMessage, Reply};

pub const LLM_LOG_ENV: &str = "NITPICK_LLM_LOG";

/// What to include in one log entry
#[derive(Default)]
pub struct LogEntry<'a> {
    pub backend: &'a str,
    pub model: &'a str,
    pub messages: &'a [LlmMessage],
    pub reply: Option<&'a Reply>,
    pub error: Option<&'a str>,
}

/// Append `entry` to the file named by `NITPICK_LLM_LOG`, if set
pub fn log_llm_interaction(entry: LogEntry<'_>) {
    let Ok(log_file) = std::env::var(LLM_LOG_ENV) else {
        return;
    };
    write_entry(Path::new(&log_file), &entry);
}

pub(crate) fn write_entry(path: &Path, entry: &LogEntry<'_>) {
    let line = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "backend": entry.backend,
        "model": entry.model,
        "request": {
            "messages": entry.messages,
            "message_count": entry.messages.len(),
        },
        "response": entry.reply,
        "error": entry.error,
    });

    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{}", line) {
                warn!("Failed to write to LLM log file: {}", e);
            }
        }
        Err(e) => {
            warn!("Failed to open LLM log file {}: {}", path.display(), e);
        }
    }

    debug!("Logged LLM interaction to {}", path.display());
}
