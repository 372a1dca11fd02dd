//! Firefly III connection settings with environment fallback

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::{ConfigStore, SETTINGS_SECTION};

/// Environment variable holding the Firefly III base URL
pub const BASE_URL_ENV: &str = "FIREFLY_BASE_URL";

/// Environment variable holding the Firefly III personal access token
pub const ACCESS_TOKEN_ENV: &str = "FIREFLY_ACCESS_TOKEN";

/// Setting name of the base URL inside the `firefly` section
pub const BASE_URL_KEY: &str = "base_url";

/// Setting name of the access token inside the `firefly` section
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// A required setting is missing from both `config.json` and the environment
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error(
        "Firefly III is not configured: set `{setting}` in the `firefly` section of config.json \
         or the {env_var} environment variable"
    )]
    Missing {
        setting: String,
        env_var: String,
    },
}

/// Looks up an environment variable
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves settings from the persisted `firefly` section, then the environment
///
/// Values are re-read on every call so edits to `config.json` apply without a restart.
#[derive(Clone)]
pub struct SettingsResolver {
    store: Arc<ConfigStore>,
    env: EnvLookup,
}

impl fmt::Debug for SettingsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsResolver")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl SettingsResolver {
    /// Creates a resolver reading the process environment
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self::with_env(store, Arc::new(|name: &str| std::env::var(name).ok()))
    }

    /// Creates a resolver with a custom environment lookup
    pub fn with_env(store: Arc<ConfigStore>, env: EnvLookup) -> Self {
        Self { store, env }
    }

    /// Returns a trimmed, non-blank setting from the persisted `firefly` section
    pub fn persisted(&self, setting: &str) -> Option<String> {
        self.store.read(|document| {
            document
                .get(SETTINGS_SECTION)
                .and_then(|section| section.get(setting))
                .and_then(Value::as_str)
                .and_then(non_blank)
        })
    }

    /// Resolves `setting`, falling back to `env_var`
    pub fn resolve(&self, setting: &str, env_var: &str) -> Result<String, ConfigurationError> {
        if let Some(value) = self.persisted(setting) {
            return Ok(value);
        }

        (self.env)(env_var)
            .as_deref()
            .and_then(non_blank)
            .ok_or_else(|| ConfigurationError::Missing {
                setting: setting.to_string(),
                env_var: env_var.to_string(),
            })
    }

    /// Firefly III base URL
    pub fn base_url(&self) -> Result<String, ConfigurationError> {
        self.resolve(BASE_URL_KEY, BASE_URL_ENV)
    }

    /// Firefly III personal access token
    pub fn access_token(&self) -> Result<String, ConfigurationError> {
        self.resolve(ACCESS_TOKEN_KEY, ACCESS_TOKEN_ENV)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
