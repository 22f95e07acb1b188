//! Structured logging utilities for airfield components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use airfield_config::log_strip_info;
//!
//! log_strip_info!("Takeoff cleared", strip = 2, total_takeoffs = 7);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const TOWER: &'static str = "TOWER";
    pub const STRIP: &'static str = "STRIP";
    pub const RADIO: &'static str = "RADIO";
    pub const SHM: &'static str = "SHM";
    pub const GROUND: &'static str = "GROUND";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `-v` count onto a level, starting from `Info`.
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === TOWER (supervisor) logging macros ===

#[macro_export]
macro_rules! log_tower_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "TOWER", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_tower_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "TOWER", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_tower_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "TOWER", $($key = $value,)* $msg)
    };
}

// === STRIP (worker) logging macros ===

#[macro_export]
macro_rules! log_strip_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "STRIP", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_strip_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "STRIP", $($key = $value,)* $msg)
    };
}

// === RADIO (signal bridge) logging macros ===

#[macro_export]
macro_rules! log_radio_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "RADIO", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_radio_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "RADIO", $($key = $value,)* $msg)
    };
}

// === SHM logging macros ===

#[macro_export]
macro_rules! log_shm_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "SHM", $($key = $value,)* $msg)
    };
}

// === GROUND logging macros ===

#[macro_export]
macro_rules! log_ground_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "GROUND", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_ground_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "GROUND", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup; `RUST_LOG` wins when set.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
