//! Hook events: the envelope posted to the server, the filter deciding
//! which events reach the reviewer, and the forwarder used by `hook forward`.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

/// Set to "1" to make `hook forward` a no-op (the server sets it for the
/// processes it spawns so their own hooks do not loop back)
pub const SKIP_FORWARD_ENV: &str = "NITPICK_SKIP_FORWARD";
/// Base URL of the hook server
pub const SERVER_URL_ENV: &str = "NITPICK_SERVER";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8081";
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Events always worth a look
pub const TRIGGER_EVENTS: [&str; 3] = ["PostToolUse", "Stop", "UserPromptSubmit"];
/// Tools whose use is always worth a look
pub const TRIGGER_TOOLS: [&str; 3] = ["Write", "Edit", "MultiEdit"];

/// Host agent that runs the hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Claude,
    Cursor,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Claude => "claude",
            Platform::Cursor => "cursor",
        }
    }

    /// Field of the hook input carrying the host's session id
    pub fn session_id_field(&self) -> &'static str {
        match self {
            Platform::Claude => "session_id",
            Platform::Cursor => "conversation_id",
        }
    }

    pub fn session_id<'a>(&self, hook_input: &'a Value) -> Option<&'a str> {
        hook_input
            .get(self.session_id_field())
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(Platform::Claude),
            "cursor" => Ok(Platform::Cursor),
            _ => Err(format!("Unknown platform: {} (expected claude or cursor)", s)),
        }
    }
}

/// Body of `POST /hook/{session_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEnvelope {
    #[serde(default = "unknown_event")]
    pub event: String,
    /// Timestamp reported by the host, if any
    #[serde(rename = "receivedAt", default, skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Stamped by the server on receipt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<String>,
}

fn unknown_event() -> String {
    "UnknownEvent".to_string()
}

impl HookEnvelope {
    /// Wrap raw hook input from the host
    pub fn from_hook_input(hook_input: Value, cwd: &Path) -> Self {
        let event = hook_input
            .get("hook_event_name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(unknown_event);
        let reported_at = ["timestamp", "time"]
            .iter()
            .find_map(|k| hook_input.get(*k).and_then(Value::as_str))
            .map(str::to_string);

        Self {
            event,
            reported_at,
            payload: hook_input,
            source_path: Some(cwd.display().to_string()),
            received_at: None,
        }
    }

    pub fn stamp_received(&mut self) {
        self.received_at = Some(Utc::now().to_rfc3339());
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.payload.get("tool_name").and_then(Value::as_str)
    }
}

/// Render an event as the labeled block the reviewer sees
pub fn format_event(envelope: &HookEnvelope) -> String {
    let ts = envelope
        .received_at
        .clone()
        .unwrap_or_else(|| Utc::now().to_rfc3339());
    let pretty = serde_json::to_string_pretty(envelope).unwrap_or_else(|_| envelope.payload.to_string());
    format!("HOOK EVENT: {}\ntime: {}\n\n```json\n{}\n```", envelope.event, ts, pretty)
}

/// Smart-trigger filter. With triggers off every event passes.
pub fn should_process(envelope: &HookEnvelope, smart_triggers: bool) -> bool {
    if !smart_triggers || TRIGGER_EVENTS.contains(&envelope.event.as_str()) {
        return true;
    }
    if let Some(tool) = envelope.tool_name()
        && TRIGGER_TOOLS.contains(&tool)
    {
        return true;
    }
    debug!("Skipping event: {}", envelope.event);
    false
}

/// `{base}/hook/{session_id}` with the id percent-encoded as one segment
pub fn hook_url(base: &str, session_id: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::Config(format!("Invalid server URL '{}': {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("Server URL cannot take a path: {}", base)))?
        .pop_if_empty()
        .push("hook")
        .push(session_id);
    Ok(url)
}

/// Parse host hook input and build the envelope plus the session id
pub fn prepare_forward(platform: Platform, raw: &str, cwd: &Path) -> Result<(String, HookEnvelope)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::HookInput("empty stdin".to_string()));
    }
    let hook_input: Value = serde_json::from_str(raw)?;
    let session_id = platform
        .session_id(&hook_input)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::HookInput(format!(
                "no {} found for platform {}",
                platform.session_id_field(),
                platform
            ))
        })?;
    Ok((session_id, HookEnvelope::from_hook_input(hook_input, cwd)))
}

/// POST the envelope to the hook server
pub async fn forward(base: &str, session_id: &str, envelope: &HookEnvelope) -> Result<()> {
    let url = hook_url(base, session_id)?;
    info!("Forwarding {} to {}", envelope.event, url);

    let client = reqwest::Client::builder().timeout(FORWARD_TIMEOUT).build()?;
    let response = client.post(url).json(envelope).send().await?;
    let response = response.error_for_status()?;
    info!("Forwarded to server: {}", response.status());
    Ok(())
}
