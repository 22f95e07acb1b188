//! Airfield counters and the single mutex that guards them.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use airfield_config::ARRIVAL_BATCH;

use crate::signals::ArrivalFeed;

/// Everything strips read or change under the airfield lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Planes ready to depart
    pub planes_waiting: u32,
    /// Takeoffs since the last batch-complete notice, in `0..notify_every`
    pub batch_counter: u32,
    /// Takeoffs cleared so far; never decreases, never exceeds the cap
    pub total_takeoffs: u32,
    /// Batch-complete notices issued
    pub batches_completed: u32,
}

/// One cleared departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Takeoff {
    /// Global sequence number, starting at 1
    pub number: u32,
    /// This takeoff closed a batch; the radio must be told
    pub batch_complete: bool,
}

impl Counters {
    pub fn cap_reached(&self, cap: u32) -> bool {
        self.total_takeoffs >= cap
    }

    /// Clear one waiting plane for departure, if there is one and the cap
    /// still allows it. Leaves the counters untouched otherwise.
    pub fn clear_for_takeoff(&mut self, cap: u32, notify_every: u32) -> Option<Takeoff> {
        if self.planes_waiting == 0 || self.cap_reached(cap) {
            return None;
        }

        self.planes_waiting -= 1;
        self.total_takeoffs += 1;
        self.batch_counter += 1;

        let batch_complete = self.batch_counter >= notify_every;
        if batch_complete {
            self.batch_counter = 0;
            self.batches_completed += 1;
        }

        Some(Takeoff {
            number: self.total_takeoffs,
            batch_complete,
        })
    }
}

/// Shared airfield state, owned by the supervisor for one run.
#[derive(Debug, Default)]
pub struct AirfieldState {
    counters: Mutex<Counters>,
}

impl AirfieldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `planes` already waiting.
    pub fn with_planes(planes: u32) -> Self {
        Self {
            counters: Mutex::new(Counters {
                planes_waiting: planes,
                ..Counters::default()
            }),
        }
    }

    /// Enter the critical section. Arrivals announced since the last entry
    /// are folded into `planes_waiting` first, so each one is counted
    /// exactly once.
    pub fn lock(&self, arrivals: &dyn ArrivalFeed) -> MutexGuard<'_, Counters> {
        // Counters are updated field by field without panicking in between,
        // so a poisoned lock still holds consistent values.
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.planes_waiting += arrivals.drain();
        counters
    }

    /// Copy of the counters, without draining arrivals.
    pub fn snapshot(&self) -> Counters {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Arrival feed driven by hand: for simulations and tests that announce
/// planes without OS signals.
#[derive(Debug, Default)]
pub struct ManualArrivals {
    pending: AtomicU32,
}

impl ManualArrivals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce one arrival batch.
    pub fn announce(&self) {
        self.pending.fetch_add(ARRIVAL_BATCH, Ordering::AcqRel);
    }
}

impl ArrivalFeed for ManualArrivals {
    fn drain(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }
}
