//! air_control - airfield takeoff coordinator
//!
//! Usage:
//!   air_control [--radio ./radio] [--strips 5] [-v]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use airfield_config::logging::{init_logging, LogLevel};
use airfield_config::{log_tower_info, Config};
use airfield_control::{RadioExit, Supervisor};

#[derive(Parser)]
#[command(name = "air_control")]
#[command(version, about = "Airfield takeoff coordinator", long_about = None)]
struct Cli {
    /// Config file to use instead of the global/project hierarchy
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Radio executable, launched with the segment name as its argument
    #[arg(long)]
    radio: Option<PathBuf>,

    /// Shared memory object name (must start with '/')
    #[arg(long)]
    shm_name: Option<String>,

    /// Number of strip workers
    #[arg(long)]
    strips: Option<usize>,

    /// Total takeoffs before the airfield closes
    #[arg(long)]
    takeoffs: Option<u32>,

    /// Runway occupancy per takeoff, in milliseconds
    #[arg(long)]
    takeoff_ms: Option<u64>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(radio) = &self.radio {
            config.radio.executable = radio.clone();
        }
        if let Some(name) = &self.shm_name {
            config.radio.shm_name = name.clone();
        }
        if let Some(strips) = self.strips {
            config.airfield.strips = strips;
        }
        if let Some(takeoffs) = self.takeoffs {
            config.airfield.total_takeoffs = takeoffs;
        }
        if let Some(ms) = self.takeoff_ms {
            config.timing.takeoff_ms = ms;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    if cli.print_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    log_tower_info!(
        "Airfield opening",
        strips = config.airfield.strips,
        runways = config.airfield.runways,
        total_takeoffs = config.airfield.total_takeoffs,
        radio = config.radio.executable.display().to_string()
    );

    let summary = Supervisor::new(config)
        .run()
        .context("Airfield run failed")?;

    let radio_killed = matches!(summary.radio_exit, RadioExit::Killed(_));
    log_tower_info!(
        "Airfield closed",
        total_takeoffs = summary.total_takeoffs,
        batches = summary.batches_completed,
        planes_left = summary.planes_left,
        peak_runways = summary.peak_runways,
        radio_pid = summary.radio_pid.as_raw(),
        radio_killed = radio_killed
    );
    for report in &summary.workers {
        log_tower_info!(
            "Strip report",
            strip = report.strip,
            takeoffs = report.takeoffs,
            idle_holds = report.idle_holds
        );
    }

    Ok(())
}
