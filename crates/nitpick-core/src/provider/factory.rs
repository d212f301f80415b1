//! Backend factory
//!
//! Resolves credentials and the model id, then builds the backend session
//! for the configured [`BackendKind`].

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::credentials::CredentialResolver;
use crate::error::{Error, Result};

use super::catalog::{resolve_model, BackendKind};
use super::claude_code::ClaudeCodeSession;
use super::compat_api::CompatChat;
use super::genai_api::GenaiChat;
use super::tool_loop::RawChatSession;
use super::{BackendFactory, BackendSession, SessionOptions};

type ResolverFn = Arc<dyn Fn(&Path) -> CredentialResolver + Send + Sync>;

/// Builds real backend sessions
#[derive(Clone)]
pub struct DefaultBackendFactory {
    resolver: ResolverFn,
}

impl Default for DefaultBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultBackendFactory {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(CredentialResolver::for_project),
        }
    }

    /// Use a custom credential resolver per project directory
    pub fn with_resolver<F>(resolver: F) -> Self
    where
        F: Fn(&Path) -> CredentialResolver + Send + Sync + 'static,
    {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, options: &SessionOptions) -> Result<Box<dyn BackendSession>> {
        let credentials = (self.resolver)(&options.project_dir).resolve(options.kind)?;

        let mut options = options.clone();
        options.model = resolve_model(options.kind, &options.model);
        info!(
            "Creating {} backend (model: {}) for {}",
            options.kind,
            options.model,
            options.project_dir.display()
        );

        let kind = options.kind;
        let session: Box<dyn BackendSession> = match kind {
            BackendKind::ClaudeCode => {
                Box::new(ClaudeCodeSession::new(options, credentials.api_key))
            }
            BackendKind::OpenAICompatible => {
                let base_url = credentials.base_url.ok_or_else(|| {
                    Error::Credentials("openai-compatible backend needs a base_url".to_string())
                })?;
                let api = CompatChat::new(base_url, credentials.api_key, options.model.clone())?
                    .with_sampling(options.temperature, options.max_tokens);
                Box::new(RawChatSession::new(api, &options))
            }
            _ => {
                let api = GenaiChat::new(kind, options.model.clone(), credentials.api_key)
                    .with_sampling(options.temperature, options.max_tokens);
                Box::new(RawChatSession::new(api, &options))
            }
        };
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(kind: BackendKind, project: &Path) -> SessionOptions {
        SessionOptions {
            kind,
            model: "claude-haiku-4-5".into(),
            system_prompt: "review".into(),
            project_dir: project.to_path_buf(),
            temperature: 0.7,
            max_tokens: 1024,
            max_tool_iterations: 5,
        }
    }

    fn isolated_factory() -> DefaultBackendFactory {
        DefaultBackendFactory::with_resolver(|project| {
            CredentialResolver::with_files(None, project.join(".nitpick/settings.toml"))
                .with_env(|_| None)
        })
    }

    #[test]
    fn test_missing_credentials_fail_at_create() {
        let dir = TempDir::new().unwrap();
        let result = isolated_factory().create(&options(BackendKind::Anthropic, dir.path()));
        assert!(matches!(result, Err(Error::Credentials(_))));
    }

    #[test]
    fn test_project_settings_enable_backend() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".nitpick")).unwrap();
        std::fs::write(
            dir.path().join(".nitpick/settings.toml"),
            "[providers.anthropic]\napi_key = \"sk-test\"\n",
        )
        .unwrap();

        let session = isolated_factory()
            .create(&options(BackendKind::Anthropic, dir.path()))
            .unwrap();
        assert!(!session.keeps_own_history());
    }

    #[test]
    fn test_native_backend_needs_no_key() {
        let dir = TempDir::new().unwrap();
        let session = isolated_factory()
            .create(&options(BackendKind::ClaudeCode, dir.path()))
            .unwrap();
        assert!(session.keeps_own_history());
    }
}
