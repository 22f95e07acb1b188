//! # airfield-config
//!
//! Configuration management for the airfield coordinator.
//!
//! Loads configuration from:
//! 1. `~/.airfield/config.toml` (global)
//! 2. `.airfield/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are applied on top by the binaries.

pub mod logging;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Planes announced by one arrival notification. Part of the signal
/// contract with the radio, so it is not configurable.
pub const ARRIVAL_BATCH: u32 = 5;

/// Default shared memory object name.
pub const DEFAULT_SHM_NAME: &str = "/shm_pids_";

pub const ENV_RADIO: &str = "AIRFIELD_RADIO";
pub const ENV_SHM_NAME: &str = "AIRFIELD_SHM_NAME";
pub const ENV_TAKEOFF_MS: &str = "AIRFIELD_TAKEOFF_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

macro_rules! merge_fields {
    ($dst:ident, $src:ident, $defaults:ident; $($section:ident.$field:ident),* $(,)?) => {
        $(
            if $src.$section.$field != $defaults.$section.$field {
                $dst.$section.$field = $src.$section.$field;
            }
        )*
    };
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub airfield: AirfieldConfig,
    pub timing: TimingConfig,
    pub radio: RadioConfig,
    pub ground: GroundConfig,
}

impl Config {
    /// Load config from standard locations. Not validated: callers apply
    /// their command-line overrides first, then call [`Config::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::from_file(&global_path)?;
            }
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let project_config = Self::from_file(&project_path)?;
            config.merge(project_config);
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load a single explicit config file (defaults fill the gaps), then
    /// apply environment overrides. Not validated, like [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.airfield/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".airfield/config.toml"))
    }

    /// Project config path: ./.airfield/config.toml
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".airfield/config.toml")
    }

    /// Merge project overrides: only values that differ from the defaults
    /// replace what the global file set.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();
        merge_fields!(self, other, defaults;
            airfield.total_takeoffs,
            airfield.strips,
            airfield.runways,
            airfield.notify_every,
            timing.takeoff_ms,
            timing.runway_backoff_ms,
            timing.radio_shutdown_ms,
            radio.executable,
            radio.shm_name,
            ground.traffic_interval_ms,
            ground.planes_limit,
            ground.overload_threshold,
            ground.max_arrival_signals,
            ground.open_attempts,
            ground.open_retry_ms,
        );
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_RADIO) {
            self.radio.executable = PathBuf::from(path);
        }
        if let Some(name) = lookup(ENV_SHM_NAME) {
            self.radio.shm_name = name;
        }
        if let Some(ms) = lookup(ENV_TAKEOFF_MS) {
            if let Ok(ms) = ms.parse() {
                self.timing.takeoff_ms = ms;
            }
        }
    }

    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.airfield;
        if a.total_takeoffs == 0 {
            return Err(ConfigError::Invalid("airfield.total_takeoffs must be > 0".into()));
        }
        if a.strips == 0 {
            return Err(ConfigError::Invalid("airfield.strips must be > 0".into()));
        }
        if a.runways == 0 {
            return Err(ConfigError::Invalid("airfield.runways must be > 0".into()));
        }
        if a.notify_every == 0 {
            return Err(ConfigError::Invalid("airfield.notify_every must be > 0".into()));
        }

        let name = self.radio.shm_name.as_str();
        let valid_name = name.len() > 1 && name.starts_with('/') && !name[1..].contains('/');
        if !valid_name {
            return Err(ConfigError::Invalid(format!(
                "radio.shm_name {:?} must be '/' followed by a non-empty name without '/'",
                name
            )));
        }
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml()
    }

    pub fn to_toml(&self) -> String {
        // Plain structs of scalars and paths always serialize.
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Airfield dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirfieldConfig {
    /// Total departures before every strip stands down
    pub total_takeoffs: u32,
    /// Number of strip worker threads
    pub strips: usize,
    /// Number of runways strips contend for
    pub runways: usize,
    /// Batch-complete notification cadence, in global takeoffs
    pub notify_every: u32,
}

impl Default for AirfieldConfig {
    fn default() -> Self {
        Self {
            total_takeoffs: 20,
            strips: 5,
            runways: 2,
            notify_every: 5,
        }
    }
}

/// Durations, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Runway occupancy per takeoff (one time unit)
    pub takeoff_ms: u64,
    /// Sleep between runway polls when both are taken
    pub runway_backoff_ms: u64,
    /// Grace period for the radio to exit before it is killed
    pub radio_shutdown_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            takeoff_ms: 1000,
            runway_backoff_ms: 1,
            radio_shutdown_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn takeoff(&self) -> Duration {
        Duration::from_millis(self.takeoff_ms)
    }

    pub fn runway_backoff(&self) -> Duration {
        Duration::from_millis(self.runway_backoff_ms)
    }

    pub fn radio_shutdown(&self) -> Duration {
        Duration::from_millis(self.radio_shutdown_ms)
    }
}

/// Radio process and the segment it is handed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Radio executable
    pub executable: PathBuf,
    /// Shared memory object name passed as the radio's only argument
    pub shm_name: String,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("./radio"),
            shm_name: DEFAULT_SHM_NAME.to_string(),
        }
    }
}

/// Ground traffic generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    pub traffic_interval_ms: u64,
    /// Planes on the ground never exceed this
    pub planes_limit: u32,
    /// "RUNWAY OVERLOADED" is reported at or above this many planes
    pub overload_threshold: u32,
    /// Arrival signals sent to the radio over the whole run
    pub max_arrival_signals: u32,
    /// Attempts to open the segment before giving up
    pub open_attempts: u32,
    pub open_retry_ms: u64,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            traffic_interval_ms: 500,
            planes_limit: 20,
            overload_threshold: 10,
            max_arrival_signals: 4,
            open_attempts: 50,
            open_retry_ms: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_matches_airfield_constants() {
        let config = Config::default();
        assert_eq!(config.airfield.total_takeoffs, 20);
        assert_eq!(config.airfield.strips, 5);
        assert_eq!(config.airfield.runways, 2);
        assert_eq!(config.airfield.notify_every, 5);
        assert_eq!(config.timing.takeoff(), Duration::from_secs(1));
        assert_eq!(config.timing.runway_backoff(), Duration::from_millis(1));
        assert_eq!(config.radio.shm_name, "/shm_pids_");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[airfield]"));
        assert!(toml_str.contains("[timing]"));
        assert!(toml_str.contains("shm_name = \"/shm_pids_\""));
    }

    #[test]
    fn test_validate_rejects_bad_segment_names() {
        for bad in ["", "/", "shm_pids_", "/a/b"] {
            let mut config = Config::default();
            config.radio.shm_name = bad.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_zero_dimensions() {
        let mut config = Config::default();
        config.airfield.strips = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.airfield.notify_every = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_RADIO, "/opt/radio"),
            (ENV_SHM_NAME, "/tower"),
            (ENV_TAKEOFF_MS, "250"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.radio.executable, PathBuf::from("/opt/radio"));
        assert_eq!(config.radio.shm_name, "/tower");
        assert_eq!(config.timing.takeoff_ms, 250);
    }

    #[test]
    fn test_bad_env_segment_name_can_be_overridden_before_validation() {
        let mut config = Config::default();
        config.apply_overrides_from(|k| (k == ENV_SHM_NAME).then(|| "no_slash".to_string()));
        assert!(config.validate().is_err());

        // A command-line --shm-name lands after the environment
        config.radio.shm_name = "/from_cli".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(|k| (k == ENV_TAKEOFF_MS).then(|| "soon".to_string()));
        assert_eq!(config.timing.takeoff_ms, 1000);
    }

    #[test]
    fn test_merge_keeps_global_values_project_leaves_default() {
        let mut global = Config::default();
        global.airfield.strips = 8;
        global.radio.executable = PathBuf::from("/usr/bin/radio");

        let mut project = Config::default();
        project.timing.takeoff_ms = 50;

        global.merge(project);
        assert_eq!(global.airfield.strips, 8);
        assert_eq!(global.radio.executable, PathBuf::from("/usr/bin/radio"));
        assert_eq!(global.timing.takeoff_ms, 50);
    }
}
