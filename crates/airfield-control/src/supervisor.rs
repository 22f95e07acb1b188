//! Process supervisor: owns one coordinator run from segment creation to
//! teardown.
//!
//! Order of a run:
//! 1. install the arrival handler (before the radio can send anything)
//! 2. create the pid segment, recording our own pid
//! 3. launch the radio with the segment name, recording its pid
//! 4. run the strips to the cap
//! 5. give the radio a bounded time to exit, then kill it
//! 6. close (never unlink) the segment

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::SigSet;
use nix::unistd::Pid;
use thiserror::Error;

use airfield_config::{log_tower_error, log_tower_info, log_tower_warn, Config};
use airfield_shm::{SharedState, ShmError, Slot};

use crate::runway::RunwayPool;
use crate::signals::{SegmentRadio, SignalBridge, SignalError, ARRIVAL};
use crate::state::AirfieldState;
use crate::worker::{Airfield, Schedule, TakeoffWorker, WorkerReport};

/// How often the radio is polled while waiting for it to exit
const EXIT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("shared memory: {0}")]
    Segment(#[from] ShmError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error("failed to launch radio {}: {source}", path.display())]
    RadioLaunch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for radio: {0}")]
    RadioWait(#[source] std::io::Error),

    #[error("failed to start strip {strip}: {source}")]
    WorkerSpawn {
        strip: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("strip {strip} panicked")]
    WorkerPanicked { strip: usize },
}

/// How the radio ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioExit {
    /// Exited on its own within the shutdown timeout
    Exited(ExitStatus),
    /// Had to be killed
    Killed(ExitStatus),
}

/// The launched radio process.
#[derive(Debug)]
pub struct Radio {
    child: Child,
    pid: Pid,
}

impl Radio {
    pub fn pid(&self) -> Pid {
        self.pid
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub total_takeoffs: u32,
    pub batches_completed: u32,
    /// Planes still on the ground once the cap was reached
    pub planes_left: u32,
    pub workers: Vec<WorkerReport>,
    pub radio_pid: Pid,
    pub radio_exit: RadioExit,
    /// Most runways held at the same moment
    pub peak_runways: usize,
}

pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the airfield to the cap.
    pub fn run(&self) -> Result<RunSummary, SupervisorError> {
        let bridge = SignalBridge::register_arrival_handler()?;

        let mut segment = SharedState::create(&self.config.radio.shm_name)?;
        log_tower_info!(
            "Pid segment created",
            name = segment.name(),
            air_pid = segment.read_slot(Slot::Air)
        );

        let radio = match self.launch_radio(&mut segment) {
            Ok(radio) => radio,
            Err(e) => {
                if let Err(close_err) = segment.close() {
                    log_tower_warn!("Failed to close segment", error = close_err.to_string());
                }
                return Err(e);
            }
        };
        let radio_pid = radio.pid();

        let state = AirfieldState::new();
        let runways = RunwayPool::new(self.config.airfield.runways);
        let link = SegmentRadio::new(&segment);
        let airfield = Airfield {
            state: &state,
            runways: &runways,
            arrivals: &bridge,
            radio: &link,
            schedule: Schedule::from_config(&self.config),
        };

        let workers = self.await_workers(airfield);
        // The radio is shut down even when a strip failed.
        let radio_exit = self.shutdown_radio(radio);
        let closed = segment.close();

        let (workers, radio_exit) = settle(workers, radio_exit, closed)?;
        let counters = state.snapshot();

        Ok(RunSummary {
            total_takeoffs: counters.total_takeoffs,
            batches_completed: counters.batches_completed,
            planes_left: counters.planes_waiting,
            workers,
            radio_pid,
            radio_exit,
            peak_runways: runways.peak_in_use(),
        })
    }

    /// Start the radio with the segment name as its only argument and
    /// record its pid in [`Slot::Radio`].
    pub fn launch_radio(&self, segment: &mut SharedState) -> Result<Radio, SupervisorError> {
        let radio = spawn_radio(&self.config.radio.executable, segment.name())?;
        segment.write_slot(Slot::Radio, radio.pid.as_raw());
        log_tower_info!("Radio launched", pid = radio.pid.as_raw());
        Ok(radio)
    }

    /// Run one worker per strip and wait for every one of them.
    pub fn await_workers(&self, airfield: Airfield<'_>) -> Result<Vec<WorkerReport>, SupervisorError> {
        let strips = self.config.airfield.strips;

        thread::scope(|s| {
            let mut handles = Vec::with_capacity(strips);
            for strip in 0..strips {
                let handle = thread::Builder::new()
                    .name(format!("strip-{strip}"))
                    .spawn_scoped(s, move || TakeoffWorker::new(strip, airfield).run())
                    .map_err(|source| SupervisorError::WorkerSpawn { strip, source })?;
                handles.push(handle);
            }

            let mut reports = Vec::with_capacity(strips);
            let mut first_error = None;
            for (strip, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(report) => reports.push(report),
                    Err(_) => {
                        log_tower_error!("Strip panicked", strip = strip);
                        first_error.get_or_insert(SupervisorError::WorkerPanicked { strip });
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(reports),
            }
        })
    }

    /// Wait up to the configured timeout for the radio to exit, then kill
    /// it. Either way the child is reaped.
    pub fn shutdown_radio(&self, radio: Radio) -> Result<RadioExit, SupervisorError> {
        wait_or_kill(radio, self.config.timing.radio_shutdown())
    }
}

/// Combine the teardown results. Strip and radio failures take precedence
/// over a failed segment close, which is only logged in that case.
fn settle(
    workers: Result<Vec<WorkerReport>, SupervisorError>,
    radio_exit: Result<RadioExit, SupervisorError>,
    closed: Result<(), ShmError>,
) -> Result<(Vec<WorkerReport>, RadioExit), SupervisorError> {
    if let Err(e) = &closed {
        log_tower_warn!("Failed to close segment", error = e.to_string());
    }
    let workers = workers?;
    let radio_exit = radio_exit?;
    closed?;
    Ok((workers, radio_exit))
}

fn spawn_radio(executable: &Path, shm_name: &str) -> Result<Radio, SupervisorError> {
    let mut command = Command::new(executable);
    command.arg(shm_name);

    // Safety: runs in the forked child before exec and only calls
    // pthread_sigmask, which is async-signal-safe.
    unsafe {
        command.pre_exec(|| {
            let mut arrival = SigSet::empty();
            arrival.add(ARRIVAL);
            arrival.thread_unblock().map_err(std::io::Error::from)
        });
    }

    let child = command
        .spawn()
        .map_err(|source| SupervisorError::RadioLaunch {
            path: executable.to_path_buf(),
            source,
        })?;
    let pid = Pid::from_raw(child.id() as i32);
    Ok(Radio { child, pid })
}

fn wait_or_kill(mut radio: Radio, timeout: Duration) -> Result<RadioExit, SupervisorError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = radio.child.try_wait().map_err(SupervisorError::RadioWait)? {
            log_tower_info!("Radio exited", pid = radio.pid.as_raw(), status = status.to_string());
            return Ok(RadioExit::Exited(status));
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(EXIT_POLL);
    }

    log_tower_warn!(
        "Radio still running after shutdown timeout, killing it",
        pid = radio.pid.as_raw(),
        timeout_ms = timeout.as_millis() as u64
    );
    if let Err(e) = radio.child.kill() {
        log_tower_warn!("Kill failed", pid = radio.pid.as_raw(), error = e.to_string());
    }
    let status = radio.child.wait().map_err(SupervisorError::RadioWait)?;
    Ok(RadioExit::Killed(status))
}
