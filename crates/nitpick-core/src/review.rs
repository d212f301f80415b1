//! Synchronous review requests (MCP tool and `POST /review`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ReviewerConfig;
use crate::error::{Error, Result};
use crate::session::{AgentConfig, Payload, SessionKey, SessionRegistry};

/// Prefix of every error string handed back in place of feedback
pub const ERROR_MARKER: &str = "❌ nitpick error:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// What the user actually asked for
    pub user_instructions: String,
    /// What the coding agent claims it did
    pub agent_plan: String,
    /// Absolute project path; selects the session agent
    pub project_path: String,
}

impl ReviewRequest {
    pub fn new(
        user_instructions: impl Into<String>,
        agent_plan: impl Into<String>,
        project_path: impl Into<String>,
    ) -> Self {
        Self {
            user_instructions: user_instructions.into(),
            agent_plan: agent_plan.into(),
            project_path: project_path.into(),
        }
    }

    /// The prompt the reviewer sees
    pub fn render(&self) -> String {
        format!(
            "## Review Request\n\n\
             **User Instructions:**\n{}\n\n\
             **Agent's Completed Changes:**\n{}\n\n\
             Review the changes that were made and check:\n\
             - Do they do what the user asked for?\n\
             - Are any claims unverified or hallucinated?\n\
             - Do they break the project's existing patterns?\n\
             - Was anything left untested?\n\
             - Were shortcuts or mocks used where real work was needed?\n\n\
             Reply with concise, actionable feedback or an approval.",
            self.user_instructions, self.agent_plan
        )
    }
}

/// Run a review on the project's session agent and wait for the feedback
pub async fn request_review(registry: &SessionRegistry, request: ReviewRequest) -> Result<String> {
    if request.project_path.trim().is_empty() {
        return Err(Error::Config("project_path is required".to_string()));
    }
    let project = PathBuf::from(&request.project_path);
    info!("Review requested for {}", project.display());

    let key = SessionKey::project(project.clone());
    let agent = registry
        .resolve_or_load(key, move || {
            AgentConfig::review(&project, &ReviewerConfig::load(&project))
        })
        .await?;
    agent.submit_request(Payload::Review(request))?.await
}

/// Error text returned to a review caller instead of feedback
pub fn error_feedback(message: impl std::fmt::Display, log_file: Option<&Path>) -> String {
    match log_file {
        Some(path) => format!(
            "{} {}\n\nCheck the log at {}",
            ERROR_MARKER,
            message,
            path.display()
        ),
        None => format!("{} {}", ERROR_MARKER, message),
    }
}
