// src/io/serial/reader.rs
//
// Serial line source for the telemetry link.
// `LineReader` frames any `Read` into lines; `SerialConnector` opens a real port
// and hands the monitor a `LineReader` over it.

use serde::Serialize;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use serialport::SerialPort;

use super::framer::{LineFramer, SerialFrame};
use super::utils::{
    line_settings, to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits,
};
use crate::io::{Connector, IoError, LinkParams, LineSource, RawFrame};

/// Back-to-back read failures after which the link is treated as gone
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 20;

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

// ============================================================================
// Line Reader
// ============================================================================

/// Frames a byte stream into lines and implements `LineSource` over it.
///
/// A read returning 0 bytes is end of stream and maps to `IoError::Disconnected`.
/// Timeouts and `WouldBlock` are an idle link and map to `Ok(None)`.
/// Other errors are `IoError::Read` until `MAX_CONSECUTIVE_READ_ERRORS` of them
/// arrive without a good read in between, then the link counts as lost.
pub struct LineReader<R: Read + Send> {
    device: String,
    inner: Option<R>,
    framer: LineFramer,
    ready: VecDeque<SerialFrame>,
    buf: [u8; 256],
    error_streak: u32,
}

impl<R: Read + Send> LineReader<R> {
    pub fn new(device: impl Into<String>, inner: R, max_line_length: usize) -> Self {
        Self {
            device: device.into(),
            inner: Some(inner),
            framer: LineFramer::new(max_line_length),
            ready: VecDeque::new(),
            buf: [0u8; 256],
            error_streak: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn next_ready(&mut self) -> Option<RawFrame> {
        let frame = self.ready.pop_front()?;
        if frame.incomplete {
            tlog!(
                "[serial:{}] Line exceeded {} bytes, passing truncated frame on",
                self.device,
                frame.bytes.len()
            );
        }
        Some(frame.bytes)
    }
}

impl<R: Read + Send> LineSource for LineReader<R> {
    fn read_line(&mut self) -> Result<Option<RawFrame>, IoError> {
        // Lines left over from a previous chunk go out before touching the port
        if let Some(line) = self.next_ready() {
            return Ok(Some(line));
        }

        let inner = match self.inner.as_mut() {
            Some(inner) => inner,
            None => return Err(IoError::disconnected(&self.device)),
        };

        match inner.read(&mut self.buf) {
            Ok(0) => return Err(IoError::disconnected(&self.device)),
            Ok(n) => {
                self.error_streak = 0;
                let frames = self.framer.feed(&self.buf[..n]);
                self.ready.extend(frames);
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                self.error_streak = 0;
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof
                ) =>
            {
                return Err(IoError::disconnected(&self.device));
            }
            Err(e) => {
                self.error_streak += 1;
                if self.error_streak >= MAX_CONSECUTIVE_READ_ERRORS {
                    tlog!(
                        "[serial:{}] {} reads failed in a row, last: {}",
                        self.device,
                        self.error_streak,
                        e
                    );
                    return Err(IoError::disconnected(&self.device));
                }
                return Err(IoError::read(&self.device, e.to_string()));
            }
        }

        Ok(self.next_ready())
    }

    fn close(&mut self) {
        // Dropping the reader releases the port
        if self.inner.take().is_none() {
            return;
        }
        if let Some(partial) = self.framer.flush() {
            tlog!(
                "[serial:{}] Discarding {} bytes of unterminated line on close",
                self.device,
                partial.bytes.len()
            );
        }
        self.ready.clear();
        tlog!("[serial:{}] Closed", self.device);
    }
}

// ============================================================================
// Serial Connector
// ============================================================================

/// Serial port handle that reports "no data yet" instead of blocking when the
/// receive buffer is empty.
pub struct PolledPort(Box<dyn SerialPort>);

impl Read for PolledPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // The status query fails (EIO on Linux) once the device is unplugged
        let available = self.0.bytes_to_read().map_err(|e| {
            std::io::Error::new(ErrorKind::BrokenPipe, format!("port status unavailable: {}", e))
        })?;
        if available == 0 {
            return Err(std::io::Error::from(ErrorKind::WouldBlock));
        }
        self.0.read(buf)
    }
}

/// Opens serial ports through the `serialport` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    type Source = LineReader<PolledPort>;

    fn open(&self, params: &LinkParams) -> Result<Self::Source, IoError> {
        if params.port.trim().is_empty() {
            return Err(IoError::config("serial port name is empty"));
        }

        let port = serialport::new(&params.port, params.baud_rate)
            .data_bits(to_serialport_data_bits(params.data_bits))
            .stop_bits(to_serialport_stop_bits(params.stop_bits))
            .parity(to_serialport_parity(params.parity))
            .timeout(params.read_timeout)
            .open()
            .map_err(|e| IoError::connection(&params.port, e.to_string()))?;

        tlog!(
            "[serial:{}] Opened at {} baud ({}), read timeout {:?}",
            params.port,
            params.baud_rate,
            line_settings(params.data_bits, params.parity, params.stop_bits),
            params.read_timeout
        );

        Ok(LineReader::new(
            params.port.clone(),
            PolledPort(port),
            params.max_line_length,
        ))
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, IoError> {
    let ports = serialport::available_ports()
        .map_err(|e| IoError::connection("serial", format!("failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|p| is_listable(&p.port_name))
        .map(SerialPortInfo::from)
        .collect())
}

/// macOS exposes every device twice. The /dev/tty.* node blocks on open
/// waiting for carrier detect, so only /dev/cu.* is offered.
fn is_listable(port_name: &str) -> bool {
    !(cfg!(target_os = "macos") && port_name.starts_with("/dev/tty."))
}

impl From<serialport::SerialPortInfo> for SerialPortInfo {
    fn from(port: serialport::SerialPortInfo) -> Self {
        let mut info = SerialPortInfo {
            port_name: port.port_name,
            port_type: String::new(),
            manufacturer: None,
            product: None,
            serial_number: None,
            vid: None,
            pid: None,
        };
        let kind = match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                info.manufacturer = usb.manufacturer;
                info.product = usb.product;
                info.serial_number = usb.serial_number;
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
                "USB"
            }
            serialport::SerialPortType::BluetoothPort => "Bluetooth",
            serialport::SerialPortType::PciPort => "PCI",
            serialport::SerialPortType::Unknown => "Unknown",
        };
        info.port_type = kind.to_string();
        info
    }
}
