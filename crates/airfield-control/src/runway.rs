//! Runway pool: independent exclusive resources, acquired without blocking.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Runway identifier; runways are named `A`, `B`, ... in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunwayId(usize);

impl RunwayId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RunwayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match u8::try_from(self.0) {
            Ok(i) if i < 26 => write!(f, "{}", (b'A' + i) as char),
            _ => write!(f, "#{}", self.0),
        }
    }
}

pub struct RunwayPool {
    runways: Vec<Mutex<()>>,
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

/// Exclusive hold on one runway. Releasing consumes the guard; dropping it
/// releases too.
#[must_use = "dropping the guard releases the runway immediately"]
pub struct RunwayGuard<'a> {
    id: RunwayId,
    pool: &'a RunwayPool,
    _lock: MutexGuard<'a, ()>,
}

impl RunwayPool {
    pub fn new(count: usize) -> Self {
        Self {
            runways: (0..count).map(|_| Mutex::new(())).collect(),
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.runways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runways.is_empty()
    }

    /// Try runway A, then B, ... without blocking. `None` when every runway
    /// is held.
    pub fn acquire_any(&self) -> Option<RunwayGuard<'_>> {
        self.runways.iter().enumerate().find_map(|(i, runway)| {
            let lock = match runway.try_lock() {
                Ok(lock) => lock,
                // The unit payload cannot be left inconsistent by a panic.
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return None,
            };
            let holders = self.in_use.fetch_add(1, Ordering::AcqRel) + 1;
            self.peak.fetch_max(holders, Ordering::AcqRel);
            Some(RunwayGuard {
                id: RunwayId(i),
                pool: self,
                _lock: lock,
            })
        })
    }

    /// Return a runway to the pool.
    pub fn release(&self, guard: RunwayGuard<'_>) {
        debug_assert!(
            std::ptr::eq(guard.pool, self),
            "runway {} released to a pool that does not own it",
            guard.id
        );
        drop(guard);
    }

    /// Runways held right now
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Highest number of runways ever held at once
    pub fn peak_in_use(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

impl Default for RunwayPool {
    fn default() -> Self {
        Self::new(2)
    }
}

impl RunwayGuard<'_> {
    pub fn id(&self) -> RunwayId {
        self.id
    }
}

impl Drop for RunwayGuard<'_> {
    fn drop(&mut self) {
        // Runs before the mutex guard field is dropped.
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for RunwayGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunwayGuard").field("id", &self.id).finish()
    }
}
