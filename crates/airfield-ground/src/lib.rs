//! # airfield-ground
//!
//! Ground traffic generator. Attaches to the coordinator's pid segment,
//! tops up the plane queue on a fixed period and tells the radio about new
//! arrivals; the radio forwards them to the coordinator.
//!
//! Signals handled:
//! - `SIGUSR1`: the radio confirms a batch of takeoffs
//! - `SIGTERM`: close the segment and exit

pub mod traffic;

use std::time::Duration;

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::unistd::getpid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use airfield_config::{log_ground_info, log_ground_warn, Config};
use airfield_control::signals::{deliver, ARRIVAL};
use airfield_shm::{SharedState, ShmError, Slot};

pub use traffic::{Announce, GroundTraffic, Tick, TrafficLimits};

/// Open the coordinator's segment, retrying while it does not exist yet.
pub async fn open_segment(name: &str, attempts: u32, retry: Duration) -> Result<SharedState, ShmError> {
    let mut tried = 0;
    loop {
        match SharedState::open(name) {
            Ok(segment) => return Ok(segment),
            // Not created yet, or created but not sized yet
            Err(ShmError::Open {
                source: Errno::ENOENT,
                ..
            })
            | Err(ShmError::Undersized { .. })
                if tried < attempts =>
            {
                tried += 1;
                tokio::time::sleep(retry).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run until terminated.
pub async fn run_ground(config: Config) -> Result<()> {
    let name = config.radio.shm_name.clone();
    let mut segment = open_segment(
        &name,
        config.ground.open_attempts,
        Duration::from_millis(config.ground.open_retry_ms),
    )
    .await
    .with_context(|| format!("Failed to open shared memory {name}"))?;

    segment.write_slot(Slot::Ground, getpid().as_raw());
    log_ground_info!("Attached to segment", name = name.as_str(), pid = getpid().as_raw());

    let mut batch_complete =
        signal(SignalKind::user_defined1()).context("Failed to listen for SIGUSR1")?;
    let mut terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;

    let period = Duration::from_millis(config.ground.traffic_interval_ms);
    let mut traffic_timer = interval_at(Instant::now() + period, period);
    traffic_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut traffic = GroundTraffic::new(TrafficLimits::from_config(&config));

    loop {
        tokio::select! {
            _ = traffic_timer.tick(), if !traffic.stopped() => {
                let radio = segment.pid(Slot::Radio);
                let tick = traffic.tick(radio.is_some());
                report_tick(&traffic, &tick);
                if tick.announce == Some(Announce::Send) {
                    deliver(radio, ARRIVAL);
                }
            }
            Some(()) = batch_complete.recv() => {
                let stopped_now = traffic.batch_completed();
                log_ground_info!(
                    "Takeoffs confirmed",
                    takeoffs = traffic.takeoffs(),
                    planes = traffic.planes()
                );
                if stopped_now {
                    log_ground_info!("All takeoffs observed, traffic stopped");
                }
            }
            _ = terminate.recv() => {
                log_ground_info!("Terminate received, shutting down");
                break;
            }
        }
    }

    segment.close().context("Failed to close shared memory")?;
    Ok(())
}

fn report_tick(traffic: &GroundTraffic, tick: &Tick) {
    if tick.overload_reported {
        log_ground_warn!("RUNWAY OVERLOADED", planes = traffic.planes() - tick.added);
    }
    match tick.announce {
        Some(Announce::Send) => {
            log_ground_info!("Traffic added, notifying radio", added = tick.added, planes = traffic.planes())
        }
        Some(Announce::NoRadio) => {
            log_ground_warn!("No radio pid in segment, arrivals not announced", planes = traffic.planes())
        }
        Some(Announce::LimitReached) => log_ground_info!(
            "Arrival signal budget spent, radio not notified",
            sent = traffic.arrivals_sent()
        ),
        None => {}
    }
}
