// src/telemetry/alerts.rs
//
// Low-vitals alert evaluation over window averages.
// The alert set is rebuilt from scratch on every reading: no latching, no hysteresis.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::window::{Channel, ChannelAverages};

/// Alert cutoffs. An average strictly below a cutoff raises that channel's alert.
///
/// The defaults reproduce the deployed wristband firmware's values and are not
/// clinical limits (resting SpO2 sits around 95-100%).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_low_cutoff")]
    pub heart_rate_low: f64,
    #[serde(default = "default_low_cutoff")]
    pub spo2_low: f64,
}

fn default_low_cutoff() -> f64 {
    30.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            heart_rate_low: default_low_cutoff(),
            spo2_low: default_low_cutoff(),
        }
    }
}

impl Thresholds {
    pub fn low_cutoff(&self, channel: Channel) -> f64 {
        match channel {
            Channel::HeartRate => self.heart_rate_low,
            Channel::SpO2 => self.spo2_low,
        }
    }
}

/// One active alert
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Alert {
    pub channel: Channel,
    /// Window average that triggered the alert
    pub average: f64,
}

impl Alert {
    pub fn message(&self) -> String {
        format!("Low {} (avg): {:.2}", self.channel.label(), self.average)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// The full set of alerts for one cycle, in channel order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AlertState {
    alerts: Vec<Alert>,
}

impl AlertState {
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn get(&self, channel: Channel) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.channel == channel)
    }

    pub fn messages(&self) -> Vec<String> {
        self.alerts.iter().map(Alert::message).collect()
    }
}

/// Derive the alert set from the current averages.
pub fn evaluate(averages: &ChannelAverages, thresholds: &Thresholds) -> AlertState {
    let alerts = Channel::ALL
        .iter()
        .filter_map(|&channel| {
            let average = averages.get(channel);
            (average < thresholds.low_cutoff(channel)).then_some(Alert { channel, average })
        })
        .collect();

    AlertState { alerts }
}
