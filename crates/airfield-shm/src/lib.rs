//! # airfield-shm
//!
//! Named POSIX shared memory segment used to exchange process ids between
//! the coordinator (`air_control`), the radio and ground control.
//!
//! ## Layout
//!
//! Three native-endian `i32` slots, nothing else:
//!
//! | Slot | Offset | Written by |
//! |------|--------|------------|
//! | [`Slot::Air`] | 0 | coordinator, at creation |
//! | [`Slot::Radio`] | 4 | coordinator, after launching the radio |
//! | [`Slot::Ground`] | 8 | ground control |
//!
//! Slot access is plain volatile loads and stores. There is no lock and no
//! fence: a value written by another process is only known to be visible
//! after a signal from that process says so.
//!
//! The coordinator never unlinks the object. Ground control may still be
//! reading it after the coordinator has exited.

use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{getpid, Pid};
use std::fs::File;
use thiserror::Error;

use airfield_config::log_shm_debug;

/// Number of pid slots in the segment
pub const SLOT_COUNT: usize = 3;

/// Width of one slot in bytes
pub const SLOT_SIZE: usize = std::mem::size_of::<i32>();

/// Total segment size; fixed at creation, never resized
pub const SEGMENT_LEN: usize = SLOT_COUNT * SLOT_SIZE;

#[derive(Debug, Error)]
pub enum ShmError {
    #[error("invalid shared memory name {0:?}: expected '/' followed by a name without '/'")]
    InvalidName(String),

    #[error("shm_open {name} failed: {source}")]
    Open {
        name: String,
        #[source]
        source: Errno,
    },

    #[error("failed to size segment {name}: {source}")]
    Resize {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to map segment {name}: {source}")]
    Map {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("segment {name} is only {len} bytes, too small for the pid slots")]
    Undersized { name: String, len: u64 },

    #[error("failed to flush segment {name}: {source}")]
    Flush {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("shm_unlink {name} failed: {source}")]
    Remove {
        name: String,
        #[source]
        source: Errno,
    },
}

impl ShmError {
    /// Raw OS error code behind this failure, if there is one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            ShmError::Open { source, .. } | ShmError::Remove { source, .. } => Some(*source as i32),
            ShmError::Resize { source, .. }
            | ShmError::Map { source, .. }
            | ShmError::Flush { source, .. } => source.raw_os_error(),
            ShmError::InvalidName(_) | ShmError::Undersized { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShmError>;

/// A pid slot in the segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Coordinator process id
    Air = 0,
    /// Radio process id
    Radio = 1,
    /// Reserved for ground control
    Ground = 2,
}

impl Slot {
    fn offset(self) -> usize {
        self as usize * SLOT_SIZE
    }
}

/// A mapped pid segment.
///
/// Reads take `&self` and may run from any number of threads; writes take
/// `&mut self`, so within one process every write happens before the
/// segment is shared.
pub struct SharedState {
    mmap: MmapMut,
    _file: File,
    name: String,
}

impl SharedState {
    /// Create (or open) the named segment, size it to [`SEGMENT_LEN`],
    /// zero it and record the calling process in [`Slot::Air`].
    ///
    /// The object is created with mode 0666 under a cleared umask so that
    /// collaborators running as other users can map it.
    pub fn create(name: &str) -> Result<Self> {
        validate_name(name)?;

        let previous = umask(Mode::empty());
        let opened = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o666),
        );
        umask(previous);

        let file = File::from(opened.map_err(|source| ShmError::Open {
            name: name.to_string(),
            source,
        })?);

        file.set_len(SEGMENT_LEN as u64)
            .map_err(|source| ShmError::Resize {
                name: name.to_string(),
                source,
            })?;

        let mmap = map_segment(&file, name)?;
        let mut state = Self {
            mmap,
            _file: file,
            name: name.to_string(),
        };

        state.mmap.fill(0);
        state.write_slot(Slot::Air, getpid().as_raw());
        log_shm_debug!("Created pid segment", name = name, air_pid = getpid().as_raw());

        Ok(state)
    }

    /// Map an existing segment without touching its contents.
    pub fn open(name: &str) -> Result<Self> {
        validate_name(name)?;

        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty()).map_err(|source| {
            ShmError::Open {
                name: name.to_string(),
                source,
            }
        })?;
        let file = File::from(fd);

        let len = file
            .metadata()
            .map_err(|source| ShmError::Map {
                name: name.to_string(),
                source,
            })?
            .len();
        if len < SEGMENT_LEN as u64 {
            return Err(ShmError::Undersized {
                name: name.to_string(),
                len,
            });
        }

        let mmap = map_segment(&file, name)?;
        log_shm_debug!("Opened pid segment", name = name);

        Ok(Self {
            mmap,
            _file: file,
            name: name.to_string(),
        })
    }

    /// Unlink the named object. The coordinator never does this; it exists
    /// for operators and test teardown.
    pub fn remove(name: &str) -> Result<()> {
        validate_name(name)?;
        shm_unlink(name).map_err(|source| ShmError::Remove {
            name: name.to_string(),
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read one slot.
    pub fn read_slot(&self, slot: Slot) -> i32 {
        // Safety: the mapping is at least SEGMENT_LEN bytes, page aligned,
        // and every slot offset is a multiple of 4.
        unsafe { std::ptr::read_volatile(self.mmap.as_ptr().add(slot.offset()) as *const i32) }
    }

    /// Write one slot.
    pub fn write_slot(&mut self, slot: Slot, value: i32) {
        // Safety: see read_slot.
        unsafe {
            std::ptr::write_volatile(self.mmap.as_mut_ptr().add(slot.offset()) as *mut i32, value)
        }
    }

    /// The process recorded in `slot`, or `None` when the slot holds 0 or a
    /// negative value.
    pub fn pid(&self, slot: Slot) -> Option<Pid> {
        match self.read_slot(slot) {
            raw if raw > 0 => Some(Pid::from_raw(raw)),
            _ => None,
        }
    }

    /// Flush, unmap and close. The named object stays in place.
    pub fn close(self) -> Result<()> {
        self.mmap.flush().map_err(|source| ShmError::Flush {
            name: self.name.clone(),
            source,
        })?;
        log_shm_debug!("Closed pid segment", name = self.name.as_str());
        Ok(())
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("name", &self.name)
            .field("air", &self.read_slot(Slot::Air))
            .field("radio", &self.read_slot(Slot::Radio))
            .field("ground", &self.read_slot(Slot::Ground))
            .finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    match name.strip_prefix('/') {
        Some(rest) if !rest.is_empty() && !rest.contains('/') => Ok(()),
        _ => Err(ShmError::InvalidName(name.to_string())),
    }
}

fn map_segment(file: &File, name: &str) -> Result<MmapMut> {
    // Safety: the segment is only ever accessed through volatile slot
    // reads and writes, so concurrent modification by other processes
    // cannot invalidate references we hand out.
    unsafe { MmapOptions::new().len(SEGMENT_LEN).map_mut(file) }.map_err(|source| ShmError::Map {
        name: name.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use airfield_config::testing::TestEnvironment;

    #[test]
    fn test_segment_is_three_i32_slots() {
        assert_eq!(SEGMENT_LEN, 12);
        assert_eq!(Slot::Air.offset(), 0);
        assert_eq!(Slot::Radio.offset(), 4);
        assert_eq!(Slot::Ground.offset(), 8);
    }

    #[test]
    fn test_create_records_own_pid_and_zeroes_rest() {
        let env = TestEnvironment::new().unwrap();
        let state = SharedState::create(&env.shm_name).unwrap();

        assert_eq!(state.read_slot(Slot::Air), std::process::id() as i32);
        assert_eq!(state.read_slot(Slot::Radio), 0);
        assert_eq!(state.read_slot(Slot::Ground), 0);
        assert_eq!(state.pid(Slot::Radio), None);

        state.close().unwrap();
        SharedState::remove(&env.shm_name).unwrap();
    }

    #[test]
    fn test_create_zeroes_a_stale_segment() {
        let env = TestEnvironment::new().unwrap();
        let mut first = SharedState::create(&env.shm_name).unwrap();
        first.write_slot(Slot::Radio, 4242);
        first.write_slot(Slot::Ground, 77);
        first.close().unwrap();

        let second = SharedState::create(&env.shm_name).unwrap();
        assert_eq!(second.read_slot(Slot::Radio), 0);
        assert_eq!(second.read_slot(Slot::Ground), 0);

        second.close().unwrap();
        SharedState::remove(&env.shm_name).unwrap();
    }

    #[test]
    fn test_pid_treats_non_positive_as_absent() {
        let env = TestEnvironment::new().unwrap();
        let mut state = SharedState::create(&env.shm_name).unwrap();

        state.write_slot(Slot::Radio, -1);
        assert_eq!(state.pid(Slot::Radio), None);
        state.write_slot(Slot::Radio, 1234);
        assert_eq!(state.pid(Slot::Radio), Some(Pid::from_raw(1234)));

        state.close().unwrap();
        SharedState::remove(&env.shm_name).unwrap();
    }

    #[test]
    fn test_invalid_names_fail_before_any_syscall() {
        for bad in ["", "/", "pids", "/a/b"] {
            let err = SharedState::create(bad).unwrap_err();
            assert!(matches!(err, ShmError::InvalidName(_)), "{bad:?}");
            assert_eq!(err.os_code(), None);
        }
    }

    #[test]
    fn test_open_missing_segment_reports_errno() {
        let env = TestEnvironment::new().unwrap();
        let err = SharedState::open(&env.shm_name).unwrap_err();
        assert!(matches!(err, ShmError::Open { .. }));
        assert_eq!(err.os_code(), Some(Errno::ENOENT as i32));
    }
}
