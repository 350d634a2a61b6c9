// src/telemetry/window.rs
//
// Per-channel sliding windows and their running averages.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

use super::decoder::Reading;

/// Default number of samples kept per channel.
pub const DEFAULT_WINDOW_CAPACITY: usize = 5;

/// Alert-monitored telemetry signal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    HeartRate,
    #[serde(rename = "spO2")]
    SpO2,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::HeartRate, Channel::SpO2];

    pub fn label(self) -> &'static str {
        match self {
            Channel::HeartRate => "Heart Rate",
            Channel::SpO2 => "SpO2",
        }
    }

    /// The sample this channel tracks from a reading
    pub fn sample(self, reading: &Reading) -> f64 {
        match self {
            Channel::HeartRate => reading.heart_rate,
            Channel::SpO2 => reading.spo2,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed-capacity FIFO of the most recent samples.
#[derive(Clone, Debug)]
pub struct SlidingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SlidingWindow {
    /// A zero capacity is bumped to one so the window can always average.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one first when full.
    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Mean over the samples currently held. `None` before the first push.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples oldest first
    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

/// Window averages after a push. Both channels always have at least one sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAverages {
    pub heart_rate: f64,
    #[serde(rename = "spO2")]
    pub spo2: f64,
}

impl ChannelAverages {
    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::HeartRate => self.heart_rate,
            Channel::SpO2 => self.spo2,
        }
    }
}

/// Owns one window per channel. Lives on the ingestion thread only.
#[derive(Clone, Debug)]
pub struct Aggregator {
    heart_rate: SlidingWindow,
    spo2: SlidingWindow,
}

impl Aggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            heart_rate: SlidingWindow::new(capacity),
            spo2: SlidingWindow::new(capacity),
        }
    }

    /// Push the reading's channel samples and return the new averages.
    pub fn ingest(&mut self, reading: &Reading) -> ChannelAverages {
        self.heart_rate.push(Channel::HeartRate.sample(reading));
        self.spo2.push(Channel::SpO2.sample(reading));

        // Both windows were just pushed, so neither is empty
        ChannelAverages {
            heart_rate: self.heart_rate.average().unwrap_or_default(),
            spo2: self.spo2.average().unwrap_or_default(),
        }
    }

    pub fn window(&self, channel: Channel) -> &SlidingWindow {
        match channel {
            Channel::HeartRate => &self.heart_rate,
            Channel::SpO2 => &self.spo2,
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}
