// src/io/mod.rs
//
// Transport abstraction for line-delimited telemetry links.
// The monitor only sees `Connector` (open) and `LineSource` (poll a line, close),
// so the serial driver and the in-memory test doubles are interchangeable.

mod error;
pub mod serial;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use error::IoError;
pub use serial::{list_serial_ports, LineFramer, LineReader, Parity, SerialConnector, SerialPortInfo};

/// One raw line from the transport, without its terminator.
pub type RawFrame = Vec<u8>;

/// Get current time in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Everything a connector needs to open a link.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkParams {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// Bounded read timeout at the transport layer
    pub read_timeout: Duration,
    /// Lines longer than this are force-split by the framer
    pub max_line_length: usize,
}

impl LinkParams {
    /// 8N1 link with the default 1 s read timeout.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            read_timeout: Duration::from_secs(1),
            max_line_length: 1024,
        }
    }
}

/// An open link that yields discrete lines.
pub trait LineSource: Send {
    /// Poll for the next complete line.
    ///
    /// Returns `Ok(None)` when no complete line is available yet (idle link).
    /// `IoError::Read` is recoverable; `IoError::Disconnected` means the link is gone.
    fn read_line(&mut self) -> Result<Option<RawFrame>, IoError>;

    /// Release the underlying connection. Must be idempotent.
    fn close(&mut self);
}

/// Opens line sources. Owned by the monitor and moved onto its ingestion thread.
pub trait Connector: Send + 'static {
    type Source: LineSource + 'static;

    fn open(&self, params: &LinkParams) -> Result<Self::Source, IoError>;
}
