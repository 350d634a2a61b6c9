// src/monitor/stats.rs
//
// Diagnostic counters for the ingestion loop. Written by the loop, readable from anywhere.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ReaderStats {
    frames_received: AtomicU64,
    readings_decoded: AtomicU64,
    parse_failures: AtomicU64,
    validation_failures: AtomicU64,
    read_errors: AtomicU64,
    dropped_updates: AtomicU64,
    dropped_events: AtomicU64,
}

/// Point-in-time copy of `ReaderStats`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub readings_decoded: u64,
    pub parse_failures: u64,
    pub validation_failures: u64,
    pub read_errors: u64,
    /// Updates the sink queue had no room for
    pub dropped_updates: u64,
    /// Status events (not updates) the sink never received
    pub dropped_events: u64,
}

impl StatsSnapshot {
    pub fn discarded_frames(&self) -> u64 {
        self.parse_failures + self.validation_failures
    }
}

impl ReaderStats {
    pub(crate) fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reading_decoded(&self) {
        self.readings_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn update_dropped(&self) {
        self.dropped_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_dropped(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            readings_decoded: self.readings_decoded.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            dropped_updates: self.dropped_updates.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
        }
    }
}
