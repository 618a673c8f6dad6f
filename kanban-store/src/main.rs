//! Kanban store server -- in-memory document store with live snapshots.
//!
//! An axum WebSocket server that keeps task collections in memory and
//! pushes a full snapshot to every subscriber whenever a document changes.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin kanban-store
//!
//! # Custom address, project and access key
//! cargo run --bin kanban-store -- --bind 127.0.0.1:8080 \
//!     --project-id real-time --access-key s3cret
//!
//! # Or via environment variables
//! KANBAN_STORE_ADDR=127.0.0.1:8080 KANBAN_ACCESS_KEY=s3cret cargo run --bin kanban-store
//! ```

use std::sync::Arc;

use clap::Parser;
use kanban_store::config::{StoreCliArgs, StoreConfig};
use kanban_store::server;

#[tokio::main]
async fn main() {
    let cli = StoreCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match StoreConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        project_id = %config.project_id,
        access_key_required = config.access_key.is_some(),
        "starting kanban store"
    );

    let state = Arc::new(config.build_state());
    let bind_addr = config.bind_addr.to_string();

    match server::start_server_with_state(&bind_addr, Arc::clone(&state)).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "store server listening");
            tokio::select! {
                result = handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "store server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested, closing connections");
                    state.close_all_connections().await;
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start store server");
            std::process::exit(1);
        }
    }
}
