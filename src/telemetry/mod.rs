// src/telemetry/mod.rs
//
// Decode -> aggregate -> evaluate, the per-frame pipeline run by the monitor.

mod alerts;
mod decoder;
mod pipeline;
mod window;

pub use alerts::{evaluate, Alert, AlertState, Thresholds};
pub use decoder::{decode_frame, DecodeError, Reading};
pub use pipeline::{Pipeline, TelemetryUpdate};
pub use window::{Aggregator, Channel, ChannelAverages, SlidingWindow, DEFAULT_WINDOW_CAPACITY};
