use anyhow::{Context, Result};
use appmanager::client::DEFAULT_DAEMON_ADDR;
use clap::{Parser, Subcommand};
use release_registry::AppManagerConfig;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "appmanager")]
#[command(about = "Edge application manager - install releases and route their addresses")]
#[command(version)]
struct Cli {
    /// Configuration file path, used to find the daemon address
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Daemon address (host:port), overrides the configuration
    #[arg(long, global = true)]
    daemon: Option<String>,

    /// Increase log verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List releases
    List {
        /// Output format (table or json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Install or upgrade a release
    Install {
        /// Release name
        name: String,

        /// Chart reference
        chart: String,

        /// Controller host or node alias
        #[arg(long)]
        host: Option<String>,

        /// Chart directory
        #[arg(long)]
        chart_dir: Option<PathBuf>,

        /// Upgrade an existing release
        #[arg(short, long)]
        upgrade: bool,
    },

    /// Uninstall a release
    Uninstall {
        /// Release name
        name: String,
    },

    /// Show release status
    Status {
        /// Release name
        name: String,

        /// Also print the rendered manifest
        #[arg(long)]
        manifest: bool,
    },

    /// Show the chart values of a release
    GetValues {
        /// Release name
        name: String,
    },

    /// Drain publish queues and stop the daemon
    Shutdown,
}

async fn daemon_addr(cli: &Cli) -> Result<String> {
    if let Some(addr) = &cli.daemon {
        return Ok(addr.clone());
    }
    match &cli.config {
        Some(path) => {
            let config = AppManagerConfig::from_file(path)
                .await
                .with_context(|| format!("Failed to load {}", path.display()))?;
            Ok(config.server.listen_addr)
        }
        None => Ok(DEFAULT_DAEMON_ADDR.to_string()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    appmanager::logging::init("warn", cli.verbose);

    smol::block_on(async move {
        let addr = daemon_addr(&cli).await?;

        match cli.command {
            Commands::List { format } => commands::list::run(&addr, &format).await,
            Commands::Install {
                name,
                chart,
                host,
                chart_dir,
                upgrade,
            } => commands::install::run(&addr, name, chart, host, chart_dir, upgrade).await,
            Commands::Uninstall { name } => commands::uninstall::run(&addr, &name).await,
            Commands::Status { name, manifest } => {
                commands::status::run(&addr, &name, manifest).await
            }
            Commands::GetValues { name } => commands::values::run(&addr, &name).await,
            Commands::Shutdown => commands::shutdown::run(&addr).await,
        }
    })
}
