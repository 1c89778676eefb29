use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use pulse_service::config::{Config, ProbeMode};
use pulse_service::engine::PulseEngine;
use pulse_service::status::DEFAULT_HISTORY_LIMIT;

#[derive(Debug, Parser)]
#[command(name = "pulse", version, about = "Recurring HTTP/ICMP health probing")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/pulse/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database file from the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Simulate probes instead of touching the network
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe all targets on a fixed interval until interrupted
    Run,
    /// Print the current status of every target as JSON
    Status,
    /// Print the most recent observations as JSON
    History {
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();

    let cli = Cli::parse();

    let mut config = Config::from_config(cli.config.as_ref()).context("Failed to load config")?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }
    if cli.mock {
        config.probe.mode = ProbeMode::Mock;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Config => {
            print!("{}", config);
        }
        Command::Status => {
            let engine = PulseEngine::initialize(config).await?;
            let snapshots = engine.get_current_status().await?;
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
        Command::History { limit } => {
            let engine = PulseEngine::initialize(config).await?;
            let history = engine.get_history(Some(limit)).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Run => {
            let engine = PulseEngine::initialize(config).await?;
            let scheduler = engine.start_scheduler();

            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received, stopping scheduler");
            scheduler.abort();
        }
    }

    Ok(())
}
