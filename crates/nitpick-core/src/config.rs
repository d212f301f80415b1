//! Configuration for Nitpick
//!
//! Reviewer settings live in `config.toml`. The project file
//! (`<project>/.nitpick/config.toml`) wins over the user file
//! (`~/.nitpick/config.toml`), which wins over built-in defaults. The first
//! file that exists and parses is used as a whole; missing fields fall back
//! to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::provider::BackendKind;

/// Per-project directory name, also used for feedback files
pub const NITPICK_DIR: &str = ".nitpick";
pub const CONFIG_FILE: &str = "config.toml";
pub const SETTINGS_FILE: &str = "settings.toml";
pub const LOG_FILE: &str = "nitpick.log";
/// Overrides the user-level directory (default `~/.nitpick`)
pub const HOME_ENV: &str = "NITPICK_HOME";

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5";

/// User-level nitpick directory
pub fn nitpick_home() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(HOME_ENV)
        && !custom.is_empty()
    {
        return Ok(expand_tilde(&custom));
    }

    dirs::home_dir()
        .map(|home| home.join(NITPICK_DIR))
        .ok_or_else(|| Error::Config("Could not find home directory".to_string()))
}

/// `<project>/.nitpick`
pub fn project_nitpick_dir(project: &Path) -> PathBuf {
    project.join(NITPICK_DIR)
}

/// Log file shared by the server, MCP and hook commands
pub fn log_file_path() -> Result<PathBuf> {
    Ok(nitpick_home()?.join(LOG_FILE))
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Reviewer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerConfig {
    /// Model name, friendly or fully qualified
    pub model: String,
    pub backend: BackendKind,
    /// Summarize old turns when the context grows
    pub auto_summary: bool,
    /// Only forward interesting hook events to the reviewer
    pub smart_triggers: bool,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Guard against a model that never stops calling tools
    pub max_tool_iterations: usize,
    /// Evict sessions idle this long; 0 disables eviction
    pub idle_timeout_secs: u64,
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            backend: BackendKind::default(),
            auto_summary: true,
            smart_triggers: true,
            temperature: 0.7,
            max_tokens: 4096,
            max_tool_iterations: 25,
            idle_timeout_secs: 3600,
        }
    }
}

impl ReviewerConfig {
    /// Load with project > user > default precedence
    pub fn load(project: &Path) -> Self {
        let mut candidates = vec![project_nitpick_dir(project).join(CONFIG_FILE)];
        match nitpick_home() {
            Ok(home) => candidates.push(home.join(CONFIG_FILE)),
            Err(e) => warn!("Skipping user config: {}", e),
        }
        Self::load_from(&candidates)
    }

    /// First existing, parseable file in `candidates` wins
    pub fn load_from(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_file(path) {
                Ok(config) => {
                    info!(
                        "Loaded config from {}: backend={}, model={}",
                        path.display(),
                        config.backend,
                        config.model
                    );
                    return config;
                }
                Err(e) => warn!("Failed to load config from {}: {}", path.display(), e),
            }
        }

        info!("No config found, using default model: {}", DEFAULT_MODEL);
        Self::default()
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }
}
