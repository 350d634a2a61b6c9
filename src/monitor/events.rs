// src/monitor/events.rs
//
// Messages from the ingestion thread to the sink.

use serde::Serialize;

use super::stats::StatsSnapshot;
use crate::io::IoError;
use crate::telemetry::TelemetryUpdate;

/// Why the ingestion loop finished
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEndReason {
    /// Explicit stop request
    Stopped,
    /// Transport reported end of stream
    Disconnected,
    /// The ingestion thread panicked
    Aborted,
}

impl StreamEndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamEndReason::Stopped => "stopped",
            StreamEndReason::Disconnected => "disconnected",
            StreamEndReason::Aborted => "aborted",
        }
    }
}

#[derive(Clone, Debug)]
pub enum MonitorEvent {
    /// Transport opened, the loop is running
    Connected { port: String, baud_rate: u32 },
    /// One decoded frame
    Update(TelemetryUpdate),
    /// Fatal: the transport could not be opened. The loop never ran.
    ConnectionFailed(IoError),
    /// The loop finished and the transport has been released
    Ended {
        reason: StreamEndReason,
        stats: StatsSnapshot,
    },
}

impl MonitorEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorEvent::ConnectionFailed(_) | MonitorEvent::Ended { .. })
    }
}
