//! Firefly Proxy - caching proxy between a single-page frontend and Firefly III
//!
//! Serves the frontend, forwards its requests to Firefly III with the
//! configured access token, and keeps list resources cached in `config.json`.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use firefly_proxy::cache::ConfigStore;
use firefly_proxy::cli::{Cli, Command};
use firefly_proxy::config::SettingsResolver;
use firefly_proxy::firefly::FireflyClient;
use firefly_proxy::server::{self, AppState};

/// Sets up log output, honouring RUST_LOG and defaulting to `info`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    let (root, command) = cli.into_command();
    let store = Arc::new(ConfigStore::in_dir(&root));

    match command {
        Command::Configure(args) => {
            if let Err(err) = args.apply(&store) {
                eprintln!("error: {err}");
                std::process::exit(2);
            }
            println!("Saved Firefly III settings to {}", store.path().display());
        }
        Command::Serve(args) => {
            let client = FireflyClient::new(SettingsResolver::new(store.clone()))?;
            let state = AppState::new(store.clone(), Arc::new(client));

            let frontend_dir = args.frontend_dir(&root);
            let frontend = frontend_dir.is_dir().then_some(frontend_dir.as_path());
            if frontend.is_none() {
                tracing::warn!(path = %frontend_dir.display(), "frontend directory not found, serving API only");
            }

            tracing::info!(config = %store.path().display(), "using config document");
            server::run_server(&args.bind, server::app(state, frontend)).await?;
        }
    }

    Ok(())
}
