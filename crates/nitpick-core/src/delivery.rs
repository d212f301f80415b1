//! File-drop feedback channel.
//!
//! In hook mode the reviewer writes its feedback to
//! `<project>/.nitpick/<session_id>.txt`. The host's next `hook notify` call
//! takes the file (read, then delete) and shows it to the coding agent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::project_nitpick_dir;
use crate::error::Result;
use crate::hook::Platform;

pub const FEEDBACK_TITLE: &str = "NITPICK FEEDBACK";
/// Exit code telling the host to surface stderr to the agent
pub const FEEDBACK_EXIT_CODE: i32 = 2;

const BANNER_WIDTH: usize = 80;

/// Where the reviewer drops feedback for one host session
pub fn feedback_file(project: &Path, session_id: &str) -> PathBuf {
    project_nitpick_dir(project).join(format!("{}.txt", session_id))
}

/// Read and delete the feedback file. A missing file is `Ok(None)`.
pub fn take_feedback(path: &Path) -> Result<Option<String>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    info!("Took feedback from {}", path.display());
    Ok(Some(text))
}

/// What `hook notify` should print and how it should exit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: i32,
}

impl Notification {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn has_feedback(&self) -> bool {
        self.exit_code == FEEDBACK_EXIT_CODE
    }
}

/// Render feedback the way each host expects it
pub fn render_feedback(platform: Platform, feedback: &str) -> Notification {
    match platform {
        Platform::Claude => {
            let rule = "=".repeat(BANNER_WIDTH);
            Notification {
                stdout: None,
                stderr: Some(format!(
                    "\n{rule}\n{FEEDBACK_TITLE}\n{rule}\n\n{feedback}\n\n{rule}\n"
                )),
                exit_code: FEEDBACK_EXIT_CODE,
            }
        }
        Platform::Cursor => Notification {
            stdout: Some(
                json!({ "followup_message": format!("{FEEDBACK_TITLE}\n\n{feedback}") })
                    .to_string(),
            ),
            stderr: None,
            exit_code: FEEDBACK_EXIT_CODE,
        },
    }
}

/// Full notify step: hook input from stdin, project dir from cwd
pub fn notify(platform: Platform, raw: &str, cwd: &Path) -> Result<Notification> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Notification::silent());
    }
    let hook_input: Value = serde_json::from_str(raw)?;
    let Some(session_id) = platform.session_id(&hook_input) else {
        debug!("No {} in hook input", platform.session_id_field());
        return Ok(Notification::silent());
    };

    match take_feedback(&feedback_file(cwd, session_id))? {
        Some(feedback) => Ok(render_feedback(platform, &feedback)),
        None => Ok(Notification::silent()),
    }
}
