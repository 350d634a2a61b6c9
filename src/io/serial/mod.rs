// src/io/serial/mod.rs
//
// Serial transport for line-delimited telemetry.
//
// - framer: newline framing with forced split on over-long lines
// - reader: LineSource over any byte stream, serialport-backed connector
// - utils: line settings (data bits, parity, stop bits)

mod framer;
mod reader;
mod utils;

pub use framer::{LineFramer, SerialFrame};
pub use reader::{list_serial_ports, LineReader, MAX_CONSECUTIVE_READ_ERRORS, PolledPort, SerialConnector, SerialPortInfo};
pub use utils::{line_settings, Parity};
