mod alerts;
mod broadcast;
mod config;
mod database;
mod monitoring;
mod orchestrator;
mod pool;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing::level_filters::LevelFilter;

use config::Config;
use orchestrator::Orchestrator;

#[derive(Debug, Parser)]
#[command(name = "netpulse", version, about = "Availability monitoring for HTTP endpoints")]
struct Cli {
    /// Config file, created with defaults when missing
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Default, Subcommand)]
enum Command {
    /// Monitor every target until interrupted
    #[default]
    Run,
    /// Check every target once and print the checks as JSON
    Once,
    /// Print stored target states and the summary as JSON
    Status,
    /// Print the stored checks of one target as JSON
    History {
        /// URL of the target as written in the config
        url: String,
        /// Trailing window to include
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    let config = Config::from_config(cli.config.as_ref())?;
    info!("{}", config);

    let pool = pool::open_pool(&config.database.path).await?;
    let orchestrator = Orchestrator::new(config, pool).await?;

    match cli.command.unwrap_or_default() {
        Command::Run => orchestrator.run().await?,
        Command::Once => {
            let checks = orchestrator.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&checks)?);
        }
        Command::Status => {
            let report = orchestrator.status().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::History { url, hours } => {
            let checks = orchestrator.history(&url, hours).await?;
            println!("{}", serde_json::to_string_pretty(&checks)?);
        }
    }

    Ok(())
}
