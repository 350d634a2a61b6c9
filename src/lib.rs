// Wristband telemetry monitor.
//
// Data flow: serial line source -> frame decoder -> sliding windows -> alert
// evaluation -> sink, driven by the monitor's ingestion thread.

#[macro_use]
pub mod logging;

pub mod cli;
pub mod io;
pub mod monitor;
pub mod settings;
pub mod telemetry;

pub use cli::run;
pub use io::{Connector, IoError, LineSource, LinkParams, SerialConnector};
pub use monitor::{Monitor, MonitorError, MonitorEvent, MonitorHandle, ReaderLifecycle};
pub use settings::MonitorConfig;
pub use telemetry::{AlertState, Reading, TelemetryUpdate};
