//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A unique shared memory object name per test
//! - A temporary working directory
//! - A scripted radio stand-in
//!
//! # Usage
//!
//! ```ignore
//! use airfield_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let radio = env.write_radio_stub(4, 100).unwrap();
//!     let config = env.config(radio);
//!     // config.radio.shm_name is unique to this test
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique names and a scratch directory
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Scratch root for scripts and logs
    pub root: PathBuf,
    /// Shared memory object name unique to this process and test
    pub shm_name: String,
    /// File the radio stand-in appends its notices to
    pub radio_log: PathBuf,
    /// Created by a radio stand-in once its signal traps are installed
    pub radio_ready: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> std::io::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();

        let shm_name = format!("/airfield_test_{}_{}", std::process::id(), test_id);
        let radio_log = root.join("radio.log");
        let radio_ready = root.join("radio.ready");

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            shm_name,
            radio_log,
            radio_ready,
            test_id,
        })
    }

    /// Write an executable `/bin/sh` radio stand-in.
    ///
    /// The script forwards `arrivals` arrival signals (`SIGUSR2`) to its
    /// parent, `interval_ms` apart, and appends one line per notice to
    /// [`radio_log`](Self::radio_log): `segment <name>` at start, `batch`
    /// for every `SIGUSR1`, `terminate` on `SIGTERM` (after which it exits 0).
    /// [`radio_ready`](Self::radio_ready) appears once the traps are set.
    pub fn write_radio_stub(&self, arrivals: u32, interval_ms: u64) -> std::io::Result<PathBuf> {
        let script = format!(
            r#"#!/bin/sh
log="{log}"
trap 'echo batch >> "$log"' USR1
trap 'echo terminate >> "$log"; exit 0' TERM
echo "segment $1" >> "$log"
: > "{ready}"
i=0
while [ "$i" -lt {arrivals} ]; do
    sleep {interval}
    kill -s USR2 "$PPID"
    i=$((i + 1))
done
while :; do
    sleep 0.05
done
"#,
            log = self.radio_log.display(),
            ready = self.radio_ready.display(),
            arrivals = arrivals,
            interval = format_seconds(interval_ms),
        );
        self.write_executable("radio.sh", &script)
    }

    /// Write an executable that ignores `SIGTERM` and never exits on its
    /// own, for exercising forced shutdown. Creates
    /// [`radio_ready`](Self::radio_ready) once `SIGTERM` is ignored.
    pub fn write_stubborn_radio(&self) -> std::io::Result<PathBuf> {
        let script = format!(
            r#"#!/bin/sh
trap '' TERM
: > "{ready}"
while :; do
    sleep 0.05
done
"#,
            ready = self.radio_ready.display(),
        );
        self.write_executable("stubborn_radio.sh", &script)
    }

    /// Wait until a launched radio stand-in has installed its traps.
    /// Returns false if it did not within `timeout`.
    pub fn wait_for_radio_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.radio_ready.exists() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    fn write_executable(&self, name: &str, contents: &str) -> std::io::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.root.join(name);
        std::fs::write(&path, contents)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// Config wired to this environment: unique segment name, the given
    /// radio executable, and millisecond-scale timings.
    pub fn config(&self, radio: impl AsRef<Path>) -> Config {
        let mut cfg = Config::default();
        cfg.radio.executable = radio.as_ref().to_path_buf();
        cfg.radio.shm_name = self.shm_name.clone();
        cfg.timing.takeoff_ms = 20;
        cfg.timing.runway_backoff_ms = 1;
        cfg.timing.radio_shutdown_ms = 1000;
        cfg.ground.traffic_interval_ms = 20;
        cfg.ground.open_retry_ms = 10;
        cfg
    }

    /// Lines the radio stand-in has logged so far.
    pub fn radio_notices(&self) -> Vec<String> {
        std::fs::read_to_string(&self.radio_log)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

fn format_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_has_unique_segment_names() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.shm_name, env2.shm_name);
        assert!(env1.shm_name.starts_with('/'));
        assert!(!env1.shm_name[1..].contains('/'));
    }

    #[test]
    fn test_radio_stub_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let env = TestEnvironment::new().unwrap();
        let path = env.write_radio_stub(4, 150).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        let script = std::fs::read_to_string(&path).unwrap();
        assert!(script.contains("sleep 0.150"));
        assert!(script.contains("-lt 4"));
    }

    #[test]
    fn test_config_is_valid_and_fast() {
        let env = TestEnvironment::new().unwrap();
        let cfg = env.config("/bin/true");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.radio.shm_name, env.shm_name);
        assert!(cfg.timing.takeoff_ms < 100);
    }

    #[test]
    fn test_no_notices_before_radio_runs() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.radio_notices().is_empty());
        assert!(!env.wait_for_radio_ready(Duration::from_millis(20)));
    }

    #[test]
    fn test_stubborn_radio_signals_ready_after_trap() {
        let env = TestEnvironment::new().unwrap();
        let path = env.write_stubborn_radio().unwrap();

        let script = std::fs::read_to_string(&path).unwrap();
        let trap = script.find("trap '' TERM").unwrap();
        let ready = script.find(": >").unwrap();
        assert!(trap < ready);

        let mut child = std::process::Command::new(&path).spawn().unwrap();
        assert!(env.wait_for_radio_ready(Duration::from_secs(5)));
        child.kill().unwrap();
        child.wait().unwrap();
    }
}
