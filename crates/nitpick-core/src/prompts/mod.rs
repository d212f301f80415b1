//! Reviewer system prompts
//!
//! The base prompt comes from the first of `<project>/.nitpick/prompt.md`,
//! `<home>/prompt.md` or the built-in default. The section for the session's
//! mode is appended, then the project's saved rules.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{nitpick_home, project_nitpick_dir};

pub const PROMPT_FILE: &str = "prompt.md";
pub const RULES_FILE: &str = "rules.md";
/// Replaced with the session's feedback file in hook mode
pub const MESSAGE_FILE_PLACEHOLDER: &str = "{message_file}";

pub mod builtin {
    pub const REVIEWER: &str = include_str!("builtin/reviewer.md");
    pub const HOOK_MODE: &str = include_str!("builtin/hook_mode.md");
    pub const REVIEW_MODE: &str = include_str!("builtin/review_mode.md");
}

/// How a session talks back to the coding agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewMode {
    /// Watches hook events, answers through the feedback file
    Hook,
    /// Answers review requests directly
    Review,
}

impl ReviewMode {
    fn section(&self) -> &'static str {
        match self {
            ReviewMode::Hook => builtin::HOOK_MODE,
            ReviewMode::Review => builtin::REVIEW_MODE,
        }
    }
}

/// Resolves the prompt files for one project
#[derive(Debug, Clone)]
pub struct PromptLoader {
    overrides: Vec<PathBuf>,
    rules: PathBuf,
}

impl PromptLoader {
    pub fn for_project(project: &Path) -> Self {
        let nitpick_dir = project_nitpick_dir(project);
        let mut overrides = vec![nitpick_dir.join(PROMPT_FILE)];
        match nitpick_home() {
            Ok(home) => overrides.push(home.join(PROMPT_FILE)),
            Err(e) => warn!("No user prompt directory: {}", e),
        }
        Self {
            overrides,
            rules: nitpick_dir.join(RULES_FILE),
        }
    }

    /// Explicit files, highest priority first
    pub fn with_files(overrides: Vec<PathBuf>, rules: PathBuf) -> Self {
        Self { overrides, rules }
    }

    /// The base prompt without mode section or rules
    pub fn base(&self) -> String {
        for path in &self.overrides {
            match std::fs::read_to_string(path) {
                Ok(text) if !text.trim().is_empty() => {
                    info!("Loading prompt from {}", path.display());
                    return text;
                }
                Ok(_) => warn!("Ignoring empty prompt file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to read {}: {}", path.display(), e),
            }
        }
        builtin::REVIEWER.to_string()
    }

    /// Full template for a mode. Hook templates still carry the placeholder.
    pub fn load(&self, mode: ReviewMode) -> String {
        let mut prompt = self.base();
        prompt.push_str("\n\n");
        prompt.push_str(mode.section());

        match std::fs::read_to_string(&self.rules) {
            Ok(rules) if !rules.trim().is_empty() => {
                info!("Loading project rules from {}", self.rules.display());
                prompt.push_str("\n\n## Project-Specific Rules\n\n");
                prompt.push_str(&rules);
            }
            _ => {}
        }
        prompt
    }
}

/// Fill in the feedback file path
pub fn with_message_file(template: &str, message_file: &Path) -> String {
    template.replace(MESSAGE_FILE_PLACEHOLDER, &message_file.display().to_string())
}
