//! Credential resolution
//!
//! Order: environment variables, then the user settings file
//! (`~/.nitpick/settings.toml`), then the project settings file
//! (`<project>/.nitpick/settings.toml`). Settings files look like:
//!
//! ```toml
//! [providers.openai-compatible]
//! api_key = "sk-..."
//! base_url = "https://llm.example.com/v1"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{nitpick_home, project_nitpick_dir, SETTINGS_FILE};
use crate::error::{Error, Result};
use crate::provider::BackendKind;

/// Resolved credentials for one backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    providers: HashMap<String, ProviderSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderSettings {
    api_key: Option<String>,
    base_url: Option<String>,
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Walks the credential sources for a project
#[derive(Clone)]
pub struct CredentialResolver {
    user_settings: Option<PathBuf>,
    project_settings: PathBuf,
    env: EnvLookup,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("user_settings", &self.user_settings)
            .field("project_settings", &self.project_settings)
            .finish()
    }
}

impl CredentialResolver {
    pub fn for_project(project: &Path) -> Self {
        Self {
            user_settings: nitpick_home().ok().map(|home| home.join(SETTINGS_FILE)),
            project_settings: project_nitpick_dir(project).join(SETTINGS_FILE),
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Explicit file locations, used by tests and custom layouts
    pub fn with_files(user_settings: Option<PathBuf>, project_settings: PathBuf) -> Self {
        Self {
            user_settings,
            project_settings,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the environment lookup
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    /// Resolve credentials for `kind`, failing with remediation steps when a
    /// required value is missing everywhere.
    pub fn resolve(&self, kind: BackendKind) -> Result<Credentials> {
        let layers = self.file_layers(kind);

        let api_key = self.lookup(kind.api_key_env(), &layers, |s| s.api_key.clone());
        let base_url = self.lookup(kind.base_url_env(), &layers, |s| s.base_url.clone());

        if kind.requires_api_key() && api_key.is_none() {
            return Err(Error::Credentials(self.remediation(kind, kind.api_key_env(), "api_key")));
        }
        if kind.requires_base_url() && base_url.is_none() {
            return Err(Error::Credentials(self.remediation(kind, kind.base_url_env(), "base_url")));
        }

        debug!("Resolved credentials for {}", kind);
        Ok(Credentials { api_key, base_url })
    }

    fn lookup(
        &self,
        env_name: Option<&str>,
        layers: &[ProviderSettings],
        field: impl Fn(&ProviderSettings) -> Option<String>,
    ) -> Option<String> {
        env_name
            .and_then(|name| (self.env)(name))
            .into_iter()
            .chain(layers.iter().filter_map(field))
            .find(|value| !value.trim().is_empty())
    }

    /// Provider sections of the user then project settings file
    fn file_layers(&self, kind: BackendKind) -> Vec<ProviderSettings> {
        self.user_settings
            .iter()
            .chain(std::iter::once(&self.project_settings))
            .filter_map(|path| read_settings(path))
            .filter_map(|mut settings| settings.providers.remove(kind.as_str()))
            .collect()
    }

    fn remediation(&self, kind: BackendKind, env_name: Option<&str>, field: &str) -> String {
        let user = self
            .user_settings
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("~/{}/{}", crate::config::NITPICK_DIR, SETTINGS_FILE));
        let mut steps = Vec::new();
        if let Some(name) = env_name {
            steps.push(format!("set the {} environment variable", name));
        }
        steps.push(format!("add `{}` under [providers.{}] in {}", field, kind, user));
        steps.push(format!(
            "add it to the project settings at {}",
            self.project_settings.display()
        ));
        format!("no {} configured for backend '{}'. To fix: {}", field, kind, steps.join("; or "))
    }
}

fn read_settings(path: &Path) -> Option<SettingsFile> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read settings {}: {}", path.display(), e);
            return None;
        }
    };
    match toml::from_str(&content) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!("Failed to parse settings {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_env_wins_over_files() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user/settings.toml");
        write(&user, "[providers.openai]\napi_key = \"from-file\"\n");

        let resolver = CredentialResolver::with_files(Some(user), dir.path().join("p/settings.toml"))
            .with_env(|name| (name == "OPENAI_API_KEY").then(|| "from-env".to_string()));

        let creds = resolver.resolve(BackendKind::OpenAI).unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_user_file_wins_over_project_file() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user/settings.toml");
        let project = dir.path().join("proj/.nitpick/settings.toml");
        write(&user, "[providers.anthropic]\napi_key = \"user-key\"\n");
        write(&project, "[providers.anthropic]\napi_key = \"project-key\"\n");

        let resolver = CredentialResolver::with_files(Some(user), project).with_env(no_env);
        let creds = resolver.resolve(BackendKind::Anthropic).unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("user-key"));
    }

    #[test]
    fn test_project_file_used_last() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("proj/.nitpick/settings.toml");
        write(
            &project,
            "[providers.openai-compatible]\napi_key = \"k\"\nbase_url = \"http://localhost:9000/v1\"\n",
        );

        let resolver = CredentialResolver::with_files(None, project).with_env(no_env);
        let creds = resolver.resolve(BackendKind::OpenAICompatible).unwrap();
        assert_eq!(creds.base_url.as_deref(), Some("http://localhost:9000/v1"));
    }

    #[test]
    fn test_missing_key_names_remediation_steps() {
        let dir = TempDir::new().unwrap();
        let resolver = CredentialResolver::with_files(
            Some(dir.path().join("settings.toml")),
            dir.path().join("proj/settings.toml"),
        )
        .with_env(no_env);

        let err = resolver.resolve(BackendKind::Gemini).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::Credentials(_)));
        assert!(msg.contains("GEMINI_API_KEY"));
        assert!(msg.contains("[providers.gemini]"));
        assert!(msg.contains("proj/settings.toml"));
    }

    #[test]
    fn test_keyless_backends_resolve_without_credentials() {
        let dir = TempDir::new().unwrap();
        let resolver =
            CredentialResolver::with_files(None, dir.path().join("settings.toml")).with_env(no_env);
        assert_eq!(resolver.resolve(BackendKind::ClaudeCode).unwrap(), Credentials::default());
        assert!(resolver.resolve(BackendKind::Ollama).is_ok());
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("settings.toml");
        write(&project, "[providers.groq]\napi_key = \"real\"\n");
        let resolver = CredentialResolver::with_files(None, project)
            .with_env(|_| Some("   ".to_string()));
        assert_eq!(
            resolver.resolve(BackendKind::Groq).unwrap().api_key.as_deref(),
            Some("real")
        );
    }
}
