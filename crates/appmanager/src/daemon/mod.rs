//! App manager daemon implementation
//!
//! The daemon owns the release registry for the lifetime of the process and
//! serves it over a WebSocket control API.

pub mod handlers;
pub mod server;

use anyhow::{Context, Result};
use async_net::TcpListener;
use release_registry::{AppManagerConfig, Registry};
use std::sync::Arc;

/// Run the daemon until a shutdown request arrives
pub async fn run(config: &AppManagerConfig) -> Result<()> {
    let registry = Registry::from_config(config).context("Failed to build release registry")?;

    let listener = TcpListener::bind(config.server.listen_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.listen_addr))?;

    server::serve(listener, Arc::new(registry)).await
}
