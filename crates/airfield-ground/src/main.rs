//! ground_control - plane traffic generator
//!
//! Usage:
//!   ground_control [--shm-name /shm_pids_] [--interval-ms 500]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use airfield_config::logging::{init_logging, LogLevel};
use airfield_config::{log_ground_info, Config};
use airfield_ground::run_ground;

#[derive(Parser)]
#[command(name = "ground_control")]
#[command(version, about = "Airfield ground traffic generator", long_about = None)]
struct Cli {
    /// Config file to use instead of the global/project hierarchy
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shared memory object created by air_control
    #[arg(long)]
    shm_name: Option<String>,

    /// Traffic period in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    if let Some(name) = cli.shm_name {
        config.radio.shm_name = name;
    }
    if let Some(ms) = cli.interval_ms {
        config.ground.traffic_interval_ms = ms;
    }
    config.validate().context("Invalid configuration")?;

    log_ground_info!(
        "Ground control starting",
        shm_name = config.radio.shm_name.as_str(),
        interval_ms = config.ground.traffic_interval_ms
    );
    run_ground(config).await
}
