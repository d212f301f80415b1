//! Error types for Nitpick Core

use thiserror::Error;

/// Result type alias using Nitpick Error
pub type Result<T> = std::result::Result<T, Error>;

/// Nitpick error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid hook input: {0}")]
    HookInput(String),

    #[error("Missing credentials: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Tool loop exceeded {0} iterations without a final answer")]
    ToolLoopExceeded(usize),

    #[error("Session agent is stopped")]
    SessionStopped,

    #[error("Operation cancelled")]
    Cancelled,
}

/// File tool errors. These never escape the tool loop; they are rendered
/// into the tool result text the model sees.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Path is outside the project directory: {0}")]
    PathOutsideProject(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
