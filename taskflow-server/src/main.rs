//! `TaskFlow` reference task service.
//!
//! An axum REST server keeping tasks in memory. Users are bearer tokens
//! listed in the config file.
//!
//! ```bash
//! cargo run --bin taskflow-server -- --bind 127.0.0.1:3000 --config server.toml
//! ```

use std::sync::Arc;

use clap::Parser;
use taskflow_server::api::{self, AppState};
use taskflow_server::config::{ServerCliArgs, ServerConfig};

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    if config.users.is_empty() {
        tracing::warn!("no users configured; every authenticated request will be rejected");
    }
    tracing::info!(addr = %config.bind_addr, users = config.users.len(), "starting task server");

    let state = Arc::new(AppState::new(config.users));
    match api::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "task server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "task server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start task server");
            std::process::exit(1);
        }
    }
}
