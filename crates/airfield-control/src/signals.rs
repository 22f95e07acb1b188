//! Signal bridge between the coordinator and the radio.
//!
//! | Notice | Signal | Direction |
//! |--------|--------|-----------|
//! | arrival | `SIGUSR2` | radio → coordinator, 5 more planes waiting |
//! | batch complete | `SIGUSR1` | coordinator → radio, every 5 global takeoffs |
//! | terminate | `SIGTERM` | coordinator → radio, once per strip at stand-down |
//!
//! The arrival handler never touches the airfield mutex: it only adds to a
//! process-wide atomic, which the next critical section drains.

use nix::errno::Errno;
use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

use airfield_config::{log_radio_debug, log_radio_warn, ARRIVAL_BATCH};
use airfield_shm::{SharedState, Slot};

pub const ARRIVAL: Signal = Signal::SIGUSR2;
pub const BATCH_COMPLETE: Signal = Signal::SIGUSR1;
pub const TERMINATE: Signal = Signal::SIGTERM;

/// Planes announced by arrival signals and not yet moved into the
/// airfield counters.
static PENDING_PLANES: AtomicU32 = AtomicU32::new(0);

extern "C" fn on_arrival(_signal: libc::c_int) {
    // Async-signal-safe: a single lock-free RMW, nothing else.
    PENDING_PLANES.fetch_add(ARRIVAL_BATCH, Ordering::AcqRel);
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to install {signal} handler: {source}")]
    Install {
        signal: Signal,
        #[source]
        source: Errno,
    },
}

/// Source of newly arrived planes, drained from inside the airfield
/// critical section.
pub trait ArrivalFeed: Sync {
    /// Take every plane announced since the previous call.
    fn drain(&self) -> u32;
}

/// Where strips send their radio notices.
pub trait RadioLink: Sync {
    fn batch_complete(&self);
    fn terminate(&self);
}

/// Outcome of one notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No radio pid was recorded
    NoTarget,
    /// The target process no longer exists
    Gone,
    Failed(Errno),
}

/// Process-wide arrival handler plus the outbound notices.
#[derive(Debug)]
pub struct SignalBridge {
    _installed: (),
}

impl SignalBridge {
    /// Install the arrival handler and discard arrivals left pending from
    /// before the call, so a new run starts with an empty queue. Safe to
    /// call more than once; every bridge reads the same pending counter.
    pub fn register_arrival_handler() -> Result<Self, SignalError> {
        let action = SigAction::new(
            SigHandler::Handler(on_arrival),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // Safety: on_arrival only performs an atomic add.
        unsafe { sigaction(ARRIVAL, &action) }.map_err(|source| SignalError::Install {
            signal: ARRIVAL,
            source,
        })?;
        let stale = PENDING_PLANES.swap(0, Ordering::AcqRel);
        log_radio_debug!(
            "Arrival handler installed",
            signal = ARRIVAL.as_str(),
            discarded_planes = stale
        );
        Ok(Self { _installed: () })
    }

    pub fn notify_batch_complete(radio: Option<Pid>) -> Delivery {
        deliver(radio, BATCH_COMPLETE)
    }

    /// Any number of strips may call this, concurrently or repeatedly.
    pub fn notify_terminate(radio: Option<Pid>) -> Delivery {
        deliver(radio, TERMINATE)
    }
}

impl ArrivalFeed for SignalBridge {
    fn drain(&self) -> u32 {
        PENDING_PLANES.swap(0, Ordering::AcqRel)
    }
}

/// Send `signal` to `target`. A missing target, or one that has already
/// exited, is not an error; anything else is logged and reported.
pub fn deliver(target: Option<Pid>, signal: Signal) -> Delivery {
    let Some(pid) = target else {
        log_radio_debug!("No radio pid recorded, notice dropped", signal = signal.as_str());
        return Delivery::NoTarget;
    };

    match kill(pid, signal) {
        Ok(()) => {
            log_radio_debug!("Notice sent", signal = signal.as_str(), pid = pid.as_raw());
            Delivery::Delivered
        }
        Err(Errno::ESRCH) => {
            log_radio_debug!("Radio already gone", signal = signal.as_str(), pid = pid.as_raw());
            Delivery::Gone
        }
        Err(errno) => {
            log_radio_warn!(
                "Notice not delivered",
                signal = signal.as_str(),
                pid = pid.as_raw(),
                errno = errno.desc()
            );
            Delivery::Failed(errno)
        }
    }
}

/// Radio link that looks the radio up in the pid segment at every send.
pub struct SegmentRadio<'a> {
    segment: &'a SharedState,
}

impl<'a> SegmentRadio<'a> {
    pub fn new(segment: &'a SharedState) -> Self {
        Self { segment }
    }
}

impl RadioLink for SegmentRadio<'_> {
    fn batch_complete(&self) {
        SignalBridge::notify_batch_complete(self.segment.pid(Slot::Radio));
    }

    fn terminate(&self) {
        SignalBridge::notify_terminate(self.segment.pid(Slot::Radio));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_missing_target_is_a_no_op() {
        assert_eq!(SignalBridge::notify_terminate(None), Delivery::NoTarget);
        assert_eq!(SignalBridge::notify_batch_complete(None), Delivery::NoTarget);
    }

    #[test]
    fn test_terminate_to_exited_process_is_tolerated() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        child.wait().unwrap();

        // Reaped: the pid no longer names a process
        assert_eq!(SignalBridge::notify_terminate(Some(pid)), Delivery::Gone);
        assert_eq!(SignalBridge::notify_terminate(Some(pid)), Delivery::Gone);
    }

    #[test]
    fn test_terminate_reaches_live_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        assert_eq!(SignalBridge::notify_terminate(Some(pid)), Delivery::Delivered);

        use std::os::unix::process::ExitStatusExt;
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }
}
