//! Command-line interface parsing for the Firefly III proxy
//!
//! `serve` (the default) runs the HTTP server; `configure` writes the Firefly
//! III connection settings into `config.json`.

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::{ConfigStore, StoreError};
use crate::config::{ACCESS_TOKEN_KEY, BASE_URL_KEY};

/// Address the server binds to when none is given
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Directory below the application root holding the frontend
pub const DEFAULT_FRONTEND_DIR: &str = "frontend";

/// Error types for CLI commands
#[derive(Debug, Error)]
pub enum CliError {
    /// `configure` was run without any setting to change
    #[error("Nothing to configure: pass --base-url and/or --access-token")]
    NothingToConfigure,

    /// The settings could not be written
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Firefly Proxy - caching proxy between the frontend and Firefly III
#[derive(Parser, Debug)]
#[command(name = "firefly-proxy")]
#[command(about = "Caching proxy between a single-page frontend and Firefly III")]
#[command(version)]
pub struct Cli {
    /// Application root holding config.json
    #[arg(long, global = true, env = "FIREFLY_PROXY_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Server options used when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve(ServeArgs),
    /// Store Firefly III connection settings in config.json
    Configure(ConfigureArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "FIREFLY_PROXY_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Directory with the static frontend (default: <root>/frontend)
    #[arg(long)]
    pub frontend: Option<PathBuf>,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            frontend: None,
        }
    }
}

impl ServeArgs {
    /// Frontend directory, resolved against the application root
    pub fn frontend_dir(&self, root: &std::path::Path) -> PathBuf {
        self.frontend
            .clone()
            .unwrap_or_else(|| root.join(DEFAULT_FRONTEND_DIR))
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ConfigureArgs {
    /// Firefly III base URL, e.g. https://firefly.example.com
    #[arg(long)]
    pub base_url: Option<String>,

    /// Firefly III personal access token
    #[arg(long)]
    pub access_token: Option<String>,
}

impl ConfigureArgs {
    /// Writes the given settings into the store's `firefly` section
    ///
    /// Settings not passed on the command line are left as they are.
    pub fn apply(&self, store: &ConfigStore) -> Result<(), CliError> {
        let updates: Vec<(&str, &str)> = [
            (BASE_URL_KEY, self.base_url.as_deref()),
            (ACCESS_TOKEN_KEY, self.access_token.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value.trim())))
        .collect();

        if updates.is_empty() {
            return Err(CliError::NothingToConfigure);
        }

        store.update_settings(|settings| {
            for (key, value) in updates {
                settings.insert(key.to_string(), Value::String(value.to_string()));
            }
        })?;
        Ok(())
    }
}

impl Cli {
    /// The command to run, defaulting to `serve`
    pub fn into_command(self) -> (PathBuf, Command) {
        let command = self.command.unwrap_or(Command::Serve(self.serve));
        (self.root, command)
    }
}
