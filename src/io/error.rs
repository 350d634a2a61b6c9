// src/io/error.rs
//
// Transport error taxonomy shared by the serial line source and the monitor loop.

use thiserror::Error;

/// Errors raised by a transport while opening or reading a line source.
///
/// The monitor treats the variants differently:
/// - `Connection` / `Config`: fatal at startup, the loop never runs
/// - `Read`: logged and counted, polling continues
/// - `Disconnected`: the link is gone, the loop ends
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IoError {
    #[error("{device}: connection failed: {message}")]
    Connection { device: String, message: String },

    #[error("{device}: read failed: {message}")]
    Read { device: String, message: String },

    #[error("{device}: disconnected")]
    Disconnected { device: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IoError {
    pub fn connection(device: &str, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn read(device: &str, message: impl Into<String>) -> Self {
        IoError::Read {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn disconnected(device: &str) -> Self {
        IoError::Disconnected {
            device: device.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        IoError::Config(message.into())
    }

    /// Whether this error ends the ingestion loop when seen while running.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IoError::Read { .. })
    }
}
