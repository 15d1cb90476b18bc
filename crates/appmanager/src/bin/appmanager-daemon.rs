//! App manager daemon
//!
//! Owns the release registry and serves the WebSocket control API used by
//! the `appmanager` CLI.

use anyhow::{Context, Result};
use clap::Parser;
use release_registry::AppManagerConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "appmanager-daemon")]
#[command(about = "Daemon owning the edge release registry", long_about = None)]
struct Args {
    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration
    #[arg(short, long)]
    listen: Option<String>,

    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    appmanager::logging::init("info", args.verbose);

    smol::block_on(async move {
        let mut config = match &args.config {
            Some(path) => AppManagerConfig::from_file(path)
                .await
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => AppManagerConfig::default(),
        };
        if let Some(listen) = args.listen {
            config.server.listen_addr = listen;
        }

        info!("Starting appmanager daemon on {}", config.server.listen_addr);
        info!("Publishing to broker at {}", config.broker.endpoint);

        appmanager::daemon::run(&config).await
    })
}
