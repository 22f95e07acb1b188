//! Strip workers.
//!
//! Each strip runs a small state machine:
//!
//! ```text
//! Scanning ──runway free──▶ RunwayHeld ──occupancy over──▶ Scanning
//!    │
//!    └──cap reached──▶ Done (terminate notice to the radio)
//! ```
//!
//! The cap is checked twice: optimistically while scanning, and again
//! under the lock once a runway is held, because other strips may have
//! cleared the last departures in between.

use std::thread;
use std::time::Duration;

use airfield_config::{log_strip_debug, log_strip_info, Config};

use crate::runway::{RunwayGuard, RunwayPool};
use crate::signals::{ArrivalFeed, RadioLink};
use crate::state::AirfieldState;

/// Limits and durations every strip follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Total takeoffs across all strips
    pub cap: u32,
    /// Batch-complete cadence, in global takeoffs
    pub notify_every: u32,
    /// Runway occupancy per hold
    pub takeoff: Duration,
    /// Wait before polling the runways again
    pub backoff: Duration,
}

impl Schedule {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cap: config.airfield.total_takeoffs,
            notify_every: config.airfield.notify_every,
            takeoff: config.timing.takeoff(),
            backoff: config.timing.runway_backoff(),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a strip works against, shared by reference.
#[derive(Clone, Copy)]
pub struct Airfield<'a> {
    pub state: &'a AirfieldState,
    pub runways: &'a RunwayPool,
    pub arrivals: &'a dyn ArrivalFeed,
    pub radio: &'a dyn RadioLink,
    pub schedule: Schedule,
}

/// What one strip did over the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub strip: usize,
    /// Departures this strip cleared
    pub takeoffs: u32,
    /// Runway holds with nothing to clear
    pub idle_holds: u32,
}

enum Phase<'a> {
    Scanning,
    RunwayHeld(RunwayGuard<'a>),
    Done,
}

pub struct TakeoffWorker<'a> {
    strip: usize,
    airfield: Airfield<'a>,
}

impl<'a> TakeoffWorker<'a> {
    pub fn new(strip: usize, airfield: Airfield<'a>) -> Self {
        Self { strip, airfield }
    }

    /// Run until the cap is reached, then send the terminate notice.
    pub fn run(self) -> WorkerReport {
        let mut report = WorkerReport {
            strip: self.strip,
            ..WorkerReport::default()
        };

        let mut phase = Phase::Scanning;
        loop {
            phase = match phase {
                Phase::Scanning => self.scan(),
                Phase::RunwayHeld(runway) => self.hold(runway, &mut report),
                Phase::Done => break,
            };
        }

        self.airfield.radio.terminate();
        log_strip_debug!(
            "Strip standing down",
            strip = self.strip,
            takeoffs = report.takeoffs,
            idle_holds = report.idle_holds
        );
        report
    }

    fn scan(&self) -> Phase<'a> {
        let Airfield {
            state,
            runways,
            arrivals,
            schedule,
            ..
        } = self.airfield;

        let cap_reached = state.lock(arrivals).cap_reached(schedule.cap);
        if cap_reached {
            return Phase::Done;
        }

        match runways.acquire_any() {
            Some(runway) => Phase::RunwayHeld(runway),
            None => {
                thread::sleep(schedule.backoff);
                Phase::Scanning
            }
        }
    }

    fn hold(&self, runway: RunwayGuard<'a>, report: &mut WorkerReport) -> Phase<'a> {
        let Airfield {
            state,
            runways,
            arrivals,
            radio,
            schedule,
        } = self.airfield;

        let cleared = {
            let mut counters = state.lock(arrivals);
            let takeoff = counters.clear_for_takeoff(schedule.cap, schedule.notify_every);
            if let Some(takeoff) = takeoff {
                log_strip_info!(
                    "Takeoff cleared",
                    strip = self.strip,
                    runway = runway.id().index(),
                    total_takeoffs = takeoff.number,
                    planes_waiting = counters.planes_waiting
                );
                if takeoff.batch_complete {
                    radio.batch_complete();
                }
            }
            takeoff.is_some()
        };

        if cleared {
            report.takeoffs += 1;
        } else {
            report.idle_holds += 1;
        }

        // The runway stays occupied for the full duration even when there
        // was nothing to clear.
        thread::sleep(schedule.takeoff);
        runways.release(runway);
        Phase::Scanning
    }
}
