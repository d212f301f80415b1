//! Backend catalogue: which backends exist, how they authenticate, and how
//! friendly model names map to provider model ids.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Supported reviewer backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendKind {
    /// `claude` CLI in stream-json mode; runs its own Read/Write tools
    #[default]
    ClaudeCode,
    /// Anthropic Messages API via genai
    Anthropic,
    /// OpenAI via genai
    OpenAI,
    /// Google Gemini via genai
    Gemini,
    /// DeepSeek via genai
    DeepSeek,
    /// Groq via genai
    Groq,
    /// Ollama (local) via genai
    Ollama,
    /// Any OpenAI-compatible `/chat/completions` endpoint
    OpenAICompatible,
}

impl BackendKind {
    pub const ALL: [BackendKind; 8] = [
        BackendKind::ClaudeCode,
        BackendKind::Anthropic,
        BackendKind::OpenAI,
        BackendKind::Gemini,
        BackendKind::DeepSeek,
        BackendKind::Groq,
        BackendKind::Ollama,
        BackendKind::OpenAICompatible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ClaudeCode => "claude-code",
            BackendKind::Anthropic => "anthropic",
            BackendKind::OpenAI => "openai",
            BackendKind::Gemini => "gemini",
            BackendKind::DeepSeek => "deepseek",
            BackendKind::Groq => "groq",
            BackendKind::Ollama => "ollama",
            BackendKind::OpenAICompatible => "openai-compatible",
        }
    }

    /// Environment variable consulted first for the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            BackendKind::ClaudeCode | BackendKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            BackendKind::OpenAI => Some("OPENAI_API_KEY"),
            BackendKind::Gemini => Some("GEMINI_API_KEY"),
            BackendKind::DeepSeek => Some("DEEPSEEK_API_KEY"),
            BackendKind::Groq => Some("GROQ_API_KEY"),
            BackendKind::Ollama => None,
            BackendKind::OpenAICompatible => Some("NITPICK_API_KEY"),
        }
    }

    /// Environment variable consulted first for a custom endpoint
    pub fn base_url_env(&self) -> Option<&'static str> {
        match self {
            BackendKind::OpenAICompatible => Some("NITPICK_BASE_URL"),
            _ => None,
        }
    }

    /// Whether a missing API key is fatal. The claude CLI can use its own
    /// login, and Ollama is keyless.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, BackendKind::ClaudeCode | BackendKind::Ollama)
    }

    pub fn requires_base_url(&self) -> bool {
        matches!(self, BackendKind::OpenAICompatible)
    }

    /// Native backends run tools and keep conversation history themselves
    pub fn is_native(&self) -> bool {
        matches!(self, BackendKind::ClaudeCode)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude-code" | "claude_code" | "claude" => Ok(BackendKind::ClaudeCode),
            "anthropic" => Ok(BackendKind::Anthropic),
            "openai" => Ok(BackendKind::OpenAI),
            "gemini" | "google" => Ok(BackendKind::Gemini),
            "deepseek" => Ok(BackendKind::DeepSeek),
            "groq" => Ok(BackendKind::Groq),
            "ollama" => Ok(BackendKind::Ollama),
            "openai-compatible" | "openai_compatible" | "compatible" => {
                Ok(BackendKind::OpenAICompatible)
            }
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendKind> for String {
    fn from(kind: BackendKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Friendly name -> Anthropic model id
static ANTHROPIC_MODELS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("haiku", "claude-haiku-4-5-20251001"),
        ("claude-haiku-4-5", "claude-haiku-4-5-20251001"),
        ("sonnet", "claude-sonnet-4-5-20250929"),
        ("claude-sonnet-4-5", "claude-sonnet-4-5-20250929"),
        ("opus", "claude-opus-4-1-20250805"),
        ("claude-opus-4", "claude-opus-4-1-20250805"),
        ("claude-opus-4-1", "claude-opus-4-1-20250805"),
        ("claude-sonnet-3-5", "claude-3-5-sonnet-20241022"),
        ("claude-haiku-3-5", "claude-3-5-haiku-20241022"),
    ])
});

/// Translate a configured model name into the id the backend expects.
/// Unknown names pass through unchanged.
pub fn resolve_model(kind: BackendKind, name: &str) -> String {
    match kind {
        BackendKind::Anthropic => ANTHROPIC_MODELS
            .get(name)
            .copied()
            .unwrap_or(name)
            .to_string(),
        _ => name.to_string(),
    }
}
