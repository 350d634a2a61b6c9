// src/telemetry/pipeline.rs
//
// One frame in, one immutable update out.

use serde::Serialize;

use super::alerts::{evaluate, AlertState, Thresholds};
use super::decoder::{decode_frame, DecodeError, Reading};
use super::window::{Aggregator, Channel, ChannelAverages};

/// Everything the sink needs for one decoded frame. Owned, so it can cross threads.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryUpdate {
    pub reading: Reading,
    pub averages: ChannelAverages,
    pub alerts: AlertState,
    pub timestamp_us: u64,
}

impl TelemetryUpdate {
    /// Text panels in display order: vitals, acceleration, alerts (empty when cleared).
    pub fn display_lines(&self) -> Vec<String> {
        let r = &self.reading;
        let mut lines = vec![
            format!("Heart Rate: {} bpm", r.heart_rate),
            format!("SpO2: {}%", r.spo2),
            format!("Pressure: {} mmHg", r.pressure),
            "Acceleration:".to_string(),
            format!("X: {:.2} g", r.accel_x),
            format!("Y: {:.2} g", r.accel_y),
            format!("Z: {:.2} g", r.accel_z),
        ];
        if !self.alerts.is_empty() {
            lines.push("Alerts:".to_string());
            lines.extend(self.alerts.messages());
        }
        lines
    }

    pub fn is_alerting(&self, channel: Channel) -> bool {
        self.alerts.get(channel).is_some()
    }
}

/// Decoder, aggregator and evaluator chained for the ingestion loop.
#[derive(Clone, Debug)]
pub struct Pipeline {
    aggregator: Aggregator,
    thresholds: Thresholds,
}

impl Pipeline {
    pub fn new(window_capacity: usize, thresholds: Thresholds) -> Self {
        Self {
            aggregator: Aggregator::new(window_capacity),
            thresholds,
        }
    }

    /// A rejected frame leaves the windows untouched.
    pub fn process(&mut self, raw: &[u8], timestamp_us: u64) -> Result<TelemetryUpdate, DecodeError> {
        let reading = decode_frame(raw)?;
        let averages = self.aggregator.ingest(&reading);
        let alerts = evaluate(&averages, &self.thresholds);

        Ok(TelemetryUpdate {
            reading,
            averages,
            alerts,
            timestamp_us,
        })
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }
}
