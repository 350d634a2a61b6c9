// src/monitor/mod.rs
//
// Telemetry reader. Owns the transport, runs decode -> aggregate -> alert on a
// dedicated blocking thread and publishes immutable updates to the sink over a
// bounded channel. The sink is never waited on: a full queue drops updates.
//
// Lifecycle:
//   Created -> Connecting -> Running -> Stopping -> Closed
//   Connecting -> Closed       open failed
//   Running -> Closed          transport lost
//   Created -> Closed          stopped before start
// Nothing leaves Closed. Reconnecting means building a new Monitor.

mod events;
mod stats;

pub use events::{MonitorEvent, StreamEndReason};
pub use stats::{ReaderStats, StatsSnapshot};

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::io::{now_us, Connector, LineSource};
use crate::settings::MonitorConfig;
use crate::telemetry::{Pipeline, TelemetryUpdate};

/// Attempts to deliver the final event through a full queue before giving up
const FINAL_EVENT_RETRIES: u32 = 10;
const FINAL_EVENT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Bytes of a rejected frame echoed into the log
const FRAME_PREVIEW_LEN: usize = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderLifecycle {
    Created,
    Connecting,
    Running,
    Stopping,
    Closed,
}

impl ReaderLifecycle {
    pub fn can_transition_to(self, next: ReaderLifecycle) -> bool {
        use ReaderLifecycle::*;
        matches!(
            (self, next),
            (Created, Connecting)
                | (Created, Closed)
                | (Connecting, Running)
                | (Connecting, Stopping)
                | (Connecting, Closed)
                | (Running, Stopping)
                | (Running, Closed)
                | (Stopping, Closed)
        )
    }
}

impl fmt::Display for ReaderLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReaderLifecycle::Created => "created",
            ReaderLifecycle::Connecting => "connecting",
            ReaderLifecycle::Running => "running",
            ReaderLifecycle::Stopping => "stopping",
            ReaderLifecycle::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Control-surface errors. Transport failures arrive as `MonitorEvent`s instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitorError {
    #[error("monitor already started (state: {0})")]
    AlreadyStarted(ReaderLifecycle),

    #[error("monitor is closed; create a new one to reconnect")]
    Closed,

    #[error("no Tokio runtime available to host the ingestion thread")]
    NoRuntime,
}

/// State shared between the control surface and the ingestion thread.
struct Shared {
    lifecycle: Mutex<ReaderLifecycle>,
    stop_flag: AtomicBool,
    stats: ReaderStats,
}

impl Shared {
    fn new() -> Self {
        Self {
            lifecycle: Mutex::new(ReaderLifecycle::Created),
            stop_flag: AtomicBool::new(false),
            stats: ReaderStats::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReaderLifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> ReaderLifecycle {
        *self.lock()
    }

    /// Apply a transition if the current state allows it.
    fn transition(&self, next: ReaderLifecycle) -> bool {
        let mut state = self.lock();
        if !state.can_transition_to(next) {
            return false;
        }
        tlog!("[monitor] {} -> {}", *state, next);
        *state = next;
        true
    }

    fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);

        let mut state = self.lock();
        let next = match *state {
            ReaderLifecycle::Created => ReaderLifecycle::Closed,
            ReaderLifecycle::Connecting | ReaderLifecycle::Running => ReaderLifecycle::Stopping,
            ReaderLifecycle::Stopping | ReaderLifecycle::Closed => return,
        };
        tlog!("[monitor] Stop requested ({} -> {})", *state, next);
        *state = next;
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }
}

/// Cloneable handle for stopping and observing a monitor from any thread.
#[derive(Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    /// Request a stop. Idempotent and non-blocking; the loop notices within
    /// one poll interval, or once an in-flight read returns.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    pub fn state(&self) -> ReaderLifecycle {
        self.shared.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

/// Background telemetry reader bound to one connector and one configuration.
pub struct Monitor<C: Connector> {
    config: MonitorConfig,
    connector: Option<C>,
    events: Option<mpsc::Sender<MonitorEvent>>,
    shared: Arc<Shared>,
    task_handle: Option<JoinHandle<()>>,
}

impl<C: Connector> Monitor<C> {
    /// Create a monitor and the receiving end of its event queue.
    pub fn new(connector: C, config: MonitorConfig) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_depth.max(1));
        let monitor = Self {
            config,
            connector: Some(connector),
            events: Some(events_tx),
            shared: Arc::new(Shared::new()),
            task_handle: None,
        };
        (monitor, events_rx)
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> ReaderLifecycle {
        self.shared.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Open the transport and start ingesting on a blocking thread.
    ///
    /// Must be called from within a Tokio runtime. Open failures are reported
    /// as `MonitorEvent::ConnectionFailed`, not through this result.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        match self.shared.state() {
            ReaderLifecycle::Created => {}
            ReaderLifecycle::Stopping | ReaderLifecycle::Closed => return Err(MonitorError::Closed),
            other => return Err(MonitorError::AlreadyStarted(other)),
        }
        // A concurrent stop may have closed us since the check
        if !self.shared.transition(ReaderLifecycle::Connecting) {
            return Err(MonitorError::Closed);
        }

        let (connector, events) = match (self.connector.take(), self.events.take()) {
            (Some(connector), Some(events)) => (connector, events),
            _ => return Err(MonitorError::Closed),
        };

        tlog!(
            "[monitor] Starting on {} at {} baud",
            self.config.port,
            self.config.baud_rate
        );

        let config = self.config.clone();
        let shared = self.shared.clone();
        let panic_shared = self.shared.clone();
        let panic_events = events.clone();

        let handle = runtime.spawn(async move {
            // Serial I/O blocks, keep it off the async workers
            let result =
                tokio::task::spawn_blocking(move || run_ingestion(connector, config, shared, events))
                    .await;

            if let Err(e) = result {
                tlog!("[monitor] Ingestion thread panicked: {:?}", e);
                panic_shared.transition(ReaderLifecycle::Closed);
                let _ = panic_events.try_send(MonitorEvent::Ended {
                    reason: StreamEndReason::Aborted,
                    stats: panic_shared.stats.snapshot(),
                });
            }
        });
        self.task_handle = Some(handle);

        Ok(())
    }

    /// Request a stop. See `MonitorHandle::stop`.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Wait for the ingestion thread to finish. Returns immediately if it never started.
    pub async fn join(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }

    /// Stop and wait until the transport has been released.
    pub async fn shutdown(&mut self) {
        self.stop();
        self.join().await;
    }
}

impl<C: Connector> Drop for Monitor<C> {
    fn drop(&mut self) {
        self.shared.request_stop();
    }
}

// ============================================================================
// Ingestion Loop
// ============================================================================

fn run_ingestion<C: Connector>(
    connector: C,
    config: MonitorConfig,
    shared: Arc<Shared>,
    events: mpsc::Sender<MonitorEvent>,
) {
    let params = config.link_params();

    let mut source = match config.validate().and_then(|_| connector.open(&params)) {
        Ok(source) => source,
        Err(e) => {
            tlog!("[monitor] Failed to open '{}': {}", params.port, e);
            shared.transition(ReaderLifecycle::Closed);
            send_final(&events, MonitorEvent::ConnectionFailed(e));
            return;
        }
    };

    // Stop arrived while the port was opening
    if shared.stop_requested() || !shared.transition(ReaderLifecycle::Running) {
        source.close();
        shared.transition(ReaderLifecycle::Closed);
        send_final(
            &events,
            MonitorEvent::Ended {
                reason: StreamEndReason::Stopped,
                stats: shared.stats.snapshot(),
            },
        );
        return;
    }

    let mut sink_gone = false;
    let connected = MonitorEvent::Connected {
        port: params.port.clone(),
        baud_rate: params.baud_rate,
    };
    if let Err(e) = events.try_send(connected) {
        shared.stats.event_dropped();
        if matches!(e, TrySendError::Closed(_)) {
            sink_gone = true;
            tlog!("[monitor] Sink receiver dropped before Connected, events are being discarded");
        } else {
            tlog!("[monitor] Sink queue full, Connected event dropped");
        }
    }

    let mut pipeline = Pipeline::new(config.window_capacity, config.thresholds);
    let poll_interval = config.poll_interval();

    let reason = loop {
        if shared.stop_requested() {
            break StreamEndReason::Stopped;
        }

        let read = source.read_line();

        // The read may have blocked for up to the transport timeout
        if shared.stop_requested() {
            break StreamEndReason::Stopped;
        }

        match read {
            Ok(Some(line)) => {
                shared.stats.frame_received();
                match pipeline.process(&line, now_us()) {
                    Ok(update) => {
                        shared.stats.reading_decoded();
                        publish(&events, update, &shared.stats, &mut sink_gone);
                    }
                    Err(e) => {
                        if e.is_parse_failure() {
                            shared.stats.parse_failure();
                        } else {
                            shared.stats.validation_failure();
                        }
                        tlog!("[decoder] Discarding frame ({}): {}", e, preview(&line));
                    }
                }
            }
            Ok(None) => std::thread::sleep(poll_interval),
            Err(e) if e.is_terminal() => {
                tlog!("[monitor] Transport lost: {}", e);
                break StreamEndReason::Disconnected;
            }
            Err(e) => {
                shared.stats.read_error();
                tlog!("[monitor] Read error, continuing: {}", e);
                std::thread::sleep(poll_interval);
            }
        }
    };

    // The only release of the transport
    source.close();
    shared.transition(ReaderLifecycle::Closed);

    let stats = shared.stats.snapshot();
    tlog!(
        "[monitor] Ingestion {} - frames: {}, readings: {}, parse failures: {}, validation failures: {}, read errors: {}, dropped updates: {}, dropped events: {}",
        reason.as_str(),
        stats.frames_received,
        stats.readings_decoded,
        stats.parse_failures,
        stats.validation_failures,
        stats.read_errors,
        stats.dropped_updates,
        stats.dropped_events
    );

    send_final(&events, MonitorEvent::Ended { reason, stats });
}

fn publish(
    events: &mpsc::Sender<MonitorEvent>,
    update: TelemetryUpdate,
    stats: &ReaderStats,
    sink_gone: &mut bool,
) {
    match events.try_send(MonitorEvent::Update(update)) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => stats.update_dropped(),
        Err(TrySendError::Closed(_)) => {
            stats.update_dropped();
            if !*sink_gone {
                *sink_gone = true;
                tlog!("[monitor] Sink receiver dropped, updates are being discarded");
            }
        }
    }
}

/// Terminal events get a short grace period on a full queue.
fn send_final(events: &mpsc::Sender<MonitorEvent>, event: MonitorEvent) {
    let mut event = event;
    for _ in 0..FINAL_EVENT_RETRIES {
        match events.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => return,
            Err(TrySendError::Full(returned)) => {
                event = returned;
                std::thread::sleep(FINAL_EVENT_RETRY_DELAY);
            }
        }
    }
    tlog!("[monitor] Sink queue full, final event dropped");
}

fn preview(line: &[u8]) -> String {
    let text = String::from_utf8_lossy(line);
    let mut out: String = text.chars().take(FRAME_PREVIEW_LEN).collect();
    if text.chars().count() > FRAME_PREVIEW_LEN {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::MAX_CONSECUTIVE_READ_ERRORS;
    use crate::io::{IoError, LineReader, LinkParams, RawFrame};
    use crate::telemetry::Channel;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Clone, Debug)]
    enum Step {
        Line(String),
        Idle,
        ReadError,
        Disconnect,
    }

    #[derive(Clone, Default)]
    struct Probe {
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl Probe {
        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    struct ScriptedConnector {
        steps: Vec<Step>,
        fail_open: bool,
        probe: Probe,
    }

    impl ScriptedConnector {
        fn new(steps: Vec<Step>) -> (Self, Probe) {
            let probe = Probe::default();
            let connector = Self {
                steps,
                fail_open: false,
                probe: probe.clone(),
            };
            (connector, probe)
        }

        fn failing() -> (Self, Probe) {
            let (mut connector, probe) = Self::new(vec![]);
            connector.fail_open = true;
            (connector, probe)
        }
    }

    impl Connector for ScriptedConnector {
        type Source = ScriptedSource;

        fn open(&self, params: &LinkParams) -> Result<ScriptedSource, IoError> {
            self.probe.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(IoError::connection(&params.port, "no such device"));
            }
            Ok(ScriptedSource {
                steps: self.steps.clone().into(),
                probe: self.probe.clone(),
            })
        }
    }

    /// Plays its script, then idles forever.
    struct ScriptedSource {
        steps: VecDeque<Step>,
        probe: Probe,
    }

    impl LineSource for ScriptedSource {
        fn read_line(&mut self) -> Result<Option<RawFrame>, IoError> {
            match self.steps.pop_front() {
                Some(Step::Line(line)) => Ok(Some(line.into_bytes())),
                Some(Step::Idle) | None => Ok(None),
                Some(Step::ReadError) => Err(IoError::read("TEST", "framing error")),
                Some(Step::Disconnect) => Err(IoError::disconnected("TEST")),
            }
        }

        fn close(&mut self) {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn frame(heart_rate: f64, oxygen: f64) -> Step {
        Step::Line(format!(
            r#"{{"Pressure":1013,"HeartRate":{},"Oxygen":{},"Acceleration X":0.0,"Acceleration Y":0.1,"Acceleration Z":1.0}}"#,
            heart_rate, oxygen
        ))
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 5,
            ..MonitorConfig::for_port("TEST", 115_200)
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<MonitorEvent>) -> MonitorEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for monitor event")
            .expect("event channel closed")
    }

    async fn next_update(rx: &mut mpsc::Receiver<MonitorEvent>) -> TelemetryUpdate {
        loop {
            match next_event(rx).await {
                MonitorEvent::Update(update) => return update,
                MonitorEvent::Connected { .. } => continue,
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    async fn next_end(rx: &mut mpsc::Receiver<MonitorEvent>) -> (StreamEndReason, StatsSnapshot) {
        loop {
            match next_event(rx).await {
                MonitorEvent::Ended { reason, stats } => return (reason, stats),
                MonitorEvent::ConnectionFailed(e) => panic!("unexpected connection failure: {}", e),
                _ => continue,
            }
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        use ReaderLifecycle::*;
        assert!(Created.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Closed));
        assert!(!Running.can_transition_to(Connecting));
        assert!(!Stopping.can_transition_to(Running));
        for next in [Created, Connecting, Running, Stopping, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (connector, probe) = ScriptedConnector::new(vec![]);
        let (mut monitor, _rx) = Monitor::new(connector, test_config());
        assert_eq!(monitor.start(), Err(MonitorError::NoRuntime));
        assert_eq!(monitor.state(), ReaderLifecycle::Created);
        assert_eq!(probe.opens(), 0);
    }

    #[tokio::test]
    async fn test_low_heart_rate_alert_raises_and_clears() {
        let mut steps: Vec<Step> = (0..5).map(|_| frame(25.0, 97.0)).collect();
        steps.push(frame(100.0, 97.0));
        let (connector, probe) = ScriptedConnector::new(steps);
        let (mut monitor, mut rx) = Monitor::new(connector, test_config());
        monitor.start().unwrap();

        let mut updates = Vec::new();
        for _ in 0..6 {
            updates.push(next_update(&mut rx).await);
        }

        let fifth = &updates[4];
        assert_eq!(fifth.averages.heart_rate, 25.0);
        let alert = fifth.alerts.get(Channel::HeartRate).unwrap();
        assert_eq!(alert.average, 25.0);
        assert_eq!(alert.message(), "Low Heart Rate (avg): 25.00");

        let sixth = &updates[5];
        assert_eq!(sixth.reading.heart_rate, 100.0);
        assert_eq!(sixth.averages.heart_rate, 40.0);
        assert!(sixth.alerts.is_empty());

        assert_eq!(monitor.state(), ReaderLifecycle::Running);
        monitor.shutdown().await;
        assert_eq!(monitor.state(), ReaderLifecycle::Closed);
        assert_eq!(probe.closes(), 1);

        let (reason, stats) = next_end(&mut rx).await;
        assert_eq!(reason, StreamEndReason::Stopped);
        assert_eq!(stats.readings_decoded, 6);
    }

    #[tokio::test]
    async fn test_missing_field_frame_is_skipped() {
        let missing_oxygen = Step::Line(
            r#"{"Pressure":1013,"HeartRate":10,"Acceleration X":0,"Acceleration Y":0,"Acceleration Z":1}"#
                .to_string(),
        );
        let (connector, _probe) = ScriptedConnector::new(vec![missing_oxygen, frame(64.0, 99.0)]);
        let (mut monitor, mut rx) = Monitor::new(connector, test_config());
        monitor.start().unwrap();

        let update = next_update(&mut rx).await;
        assert_eq!(update.reading.heart_rate, 64.0);
        // The rejected frame never reached the window
        assert_eq!(update.averages.heart_rate, 64.0);

        let stats = monitor.stats();
        assert_eq!(stats.validation_failures, 1);
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.readings_decoded, 1);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_stop_loop() {
        let (connector, _probe) = ScriptedConnector::new(vec![
            Step::Line("HR:72 SpO2:98 ###".to_string()),
            Step::Idle,
            frame(72.0, 98.0),
        ]);
        let (mut monitor, mut rx) = Monitor::new(connector, test_config());
        monitor.start().unwrap();

        let update = next_update(&mut rx).await;
        assert_eq!(update.reading.spo2, 98.0);
        assert_eq!(monitor.stats().parse_failures, 1);
        assert_eq!(monitor.state(), ReaderLifecycle::Running);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_read_error_is_not_fatal() {
        let (connector, _probe) =
            ScriptedConnector::new(vec![Step::ReadError, Step::ReadError, frame(80.0, 96.0)]);
        let (mut monitor, mut rx) = Monitor::new(connector, test_config());
        monitor.start().unwrap();

        let update = next_update(&mut rx).await;
        assert_eq!(update.reading.heart_rate, 80.0);
        assert_eq!(monitor.stats().read_errors, 2);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_ends_loop_and_releases_transport() {
        let (connector, probe) = ScriptedConnector::new(vec![frame(70.0, 97.0), Step::Disconnect]);
        let (mut monitor, mut rx) = Monitor::new(connector, test_config());
        monitor.start().unwrap();

        next_update(&mut rx).await;
        let (reason, _) = next_end(&mut rx).await;
        assert_eq!(reason, StreamEndReason::Disconnected);
        assert_eq!(monitor.state(), ReaderLifecycle::Closed);

        monitor.join().await;
        assert_eq!(probe.closes(), 1);

        // Stopping after the fact changes nothing
        monitor.stop();
        assert_eq!(monitor.state(), ReaderLifecycle::Closed);
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_releases_once() {
        let (connector, probe) = ScriptedConnector::new(vec![]);
        let (mut monitor, mut rx) = Monitor::new(connector, test_config());
        monitor.start().unwrap();

        match next_event(&mut rx).await {
            MonitorEvent::Connected { port, baud_rate } => {
                assert_eq!(port, "TEST");
                assert_eq!(baud_rate, 115_200);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let handle = monitor.handle();
        let racers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || handle.stop())
            })
            .collect();
        monitor.stop();
        monitor.stop();
        for racer in racers {
            racer.join().unwrap();
        }

        monitor.join().await;
        assert_eq!(monitor.state(), ReaderLifecycle::Closed);
        assert_eq!(handle.state(), ReaderLifecycle::Closed);
        assert_eq!(probe.closes(), 1);

        monitor.stop();
        assert_eq!(monitor.state(), ReaderLifecycle::Closed);
        assert_eq!(probe.closes(), 1);

        let (reason, _) = next_end(&mut rx).await;
        assert_eq!(reason, StreamEndReason::Stopped);
        assert_eq!(monitor.start(), Err(MonitorError::Closed));
    }

    #[tokio::test]
    async fn test_connection_failure_is_fatal() {
        let (connector, probe) = ScriptedConnector::failing();
        let (mut monitor, mut rx) = Monitor::new(connector, test_config());
        monitor.start().unwrap();

        match next_event(&mut rx).await {
            MonitorEvent::ConnectionFailed(IoError::Connection { device, .. }) => {
                assert_eq!(device, "TEST")
            }
            other => panic!("unexpected event: {:?}", other),
        }

        monitor.join().await;
        assert_eq!(monitor.state(), ReaderLifecycle::Closed);
        assert_eq!(probe.opens(), 1);
        assert_eq!(probe.closes(), 0);
        assert_eq!(monitor.start(), Err(MonitorError::Closed));
    }

    #[tokio::test]
    async fn test_empty_port_reported_as_connection_failure() {
        let (connector, probe) = ScriptedConnector::new(vec![]);
        let config = MonitorConfig {
            port: String::new(),
            ..test_config()
        };
        let (mut monitor, mut rx) = Monitor::new(connector, config);
        monitor.start().unwrap();

        let event = next_event(&mut rx).await;
        assert!(matches!(event, MonitorEvent::ConnectionFailed(IoError::Config(_))));
        assert!(event.is_terminal());
        monitor.join().await;
        assert_eq!(probe.opens(), 0);
    }

    #[tokio::test]
    async fn test_stop_before_start_closes() {
        let (connector, probe) = ScriptedConnector::new(vec![]);
        let (mut monitor, _rx) = Monitor::new(connector, test_config());

        monitor.stop();
        assert_eq!(monitor.state(), ReaderLifecycle::Closed);
        assert_eq!(monitor.start(), Err(MonitorError::Closed));
        assert_eq!(probe.opens(), 0);
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let (connector, _probe) = ScriptedConnector::new(vec![]);
        let (mut monitor, _rx) = Monitor::new(connector, test_config());
        monitor.start().unwrap();

        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyStarted(_))));
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_sink_drops_updates_without_blocking() {
        let steps: Vec<Step> = (0..5).map(|_| frame(70.0, 97.0)).collect();
        let (connector, probe) = ScriptedConnector::new(steps);
        let config = MonitorConfig {
            event_queue_depth: 1,
            ..test_config()
        };
        let (mut monitor, mut rx) = Monitor::new(connector, config);
        monitor.start().unwrap();

        // Nobody drains the queue: Connected fills it, every update is dropped
        let handle = monitor.handle();
        wait_until(|| handle.stats().frames_received == 5).await;
        monitor.shutdown().await;

        let stats = monitor.stats();
        assert_eq!(stats.readings_decoded, 5);
        assert_eq!(stats.dropped_updates, 5);
        assert_eq!(probe.closes(), 1);
        assert!(matches!(next_event(&mut rx).await, MonitorEvent::Connected { .. }));
    }

    /// Fails every read the way a hung-up tty does. Counts releases of the port.
    struct DeadPort {
        probe: Probe,
    }

    impl std::io::Read for DeadPort {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "Input/output error"))
        }
    }

    impl Drop for DeadPort {
        fn drop(&mut self) {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct DeadPortConnector {
        probe: Probe,
    }

    impl Connector for DeadPortConnector {
        type Source = LineReader<DeadPort>;

        fn open(&self, params: &LinkParams) -> Result<Self::Source, IoError> {
            self.probe.opens.fetch_add(1, Ordering::SeqCst);
            let port = DeadPort {
                probe: self.probe.clone(),
            };
            Ok(LineReader::new(params.port.clone(), port, params.max_line_length))
        }
    }

    #[tokio::test]
    async fn test_unplugged_port_ends_with_disconnect() {
        let probe = Probe::default();
        let connector = DeadPortConnector {
            probe: probe.clone(),
        };
        let (mut monitor, mut rx) = Monitor::new(connector, test_config());
        monitor.start().unwrap();

        let (reason, stats) = next_end(&mut rx).await;
        assert_eq!(reason, StreamEndReason::Disconnected);
        assert_eq!(stats.read_errors, u64::from(MAX_CONSECUTIVE_READ_ERRORS - 1));

        monitor.join().await;
        assert_eq!(monitor.state(), ReaderLifecycle::Closed);
        assert_eq!(probe.opens(), 1);
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test]
    async fn test_connected_event_to_gone_sink_is_counted() {
        let (connector, probe) = ScriptedConnector::new(vec![frame(70.0, 97.0)]);
        let (mut monitor, rx) = Monitor::new(connector, test_config());
        drop(rx);
        monitor.start().unwrap();

        let handle = monitor.handle();
        wait_until(|| handle.stats().readings_decoded == 1).await;
        monitor.shutdown().await;

        let stats = monitor.stats();
        assert_eq!(stats.dropped_events, 1);
        assert_eq!(stats.dropped_updates, 1);
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn test_preview_truncates() {
        let long = vec![b'x'; 200];
        let shown = preview(&long);
        assert_eq!(shown.len(), FRAME_PREVIEW_LEN + 3);
        assert!(shown.ends_with("..."));
        assert_eq!(preview(b"short"), "short");
    }
}
