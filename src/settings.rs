use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::{IoError, LinkParams, Parity};
use crate::telemetry::{Thresholds, DEFAULT_WINDOW_CAPACITY};

/// Monitor configuration. Every field has a default so a config file only
/// needs to name what it changes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    #[serde(default)]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    /// Transport-level read timeout
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Idle wait between polls when no line is available
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Bounded depth of the event queue towards the sink
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
    #[serde(default)]
    pub thresholds: Thresholds,
}

fn default_baud_rate() -> u32 {
    115_200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_window_capacity() -> usize {
    DEFAULT_WINDOW_CAPACITY
}
fn default_max_line_length() -> usize {
    1024
}
fn default_event_queue_depth() -> usize {
    64
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            read_timeout_ms: default_read_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            window_capacity: default_window_capacity(),
            max_line_length: default_max_line_length(),
            event_queue_depth: default_event_queue_depth(),
            thresholds: Thresholds::default(),
        }
    }
}

impl MonitorConfig {
    /// Default settings bound to a port and baud rate
    pub fn for_port(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// `<config dir>/vitalwatch/monitor.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vitalwatch")
            .join("monitor.toml")
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, IoError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IoError::config(format!("failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| IoError::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self, IoError> {
        toml::from_str(content).map_err(|e| IoError::config(format!("failed to parse settings: {}", e)))
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<(), IoError> {
        if self.port.trim().is_empty() {
            return Err(IoError::config("a serial port is required (e.g. COM4 or /dev/ttyUSB0)"));
        }
        if self.baud_rate == 0 {
            return Err(IoError::config("baud_rate must be greater than zero"));
        }
        if self.window_capacity == 0 {
            return Err(IoError::config("window_capacity must be at least 1"));
        }
        if self.event_queue_depth == 0 {
            return Err(IoError::config("event_queue_depth must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(IoError::config("poll_interval_ms must be greater than zero"));
        }
        if self.max_line_length == 0 {
            return Err(IoError::config("max_line_length must be greater than zero"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn link_params(&self) -> LinkParams {
        LinkParams {
            port: self.port.trim().to_string(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            max_line_length: self.max_line_length,
        }
    }
}
