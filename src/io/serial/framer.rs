// src/io/serial/framer.rs
//
// Newline framing for the telemetry link.
// Bytes arrive in arbitrary chunks; complete lines come out in arrival order.

const LF: u8 = b'\n';
const CR: u8 = b'\r';

/// A line extracted from the byte stream
#[derive(Debug, Clone, PartialEq)]
pub struct SerialFrame {
    /// Line bytes, terminator and trailing CR stripped
    pub bytes: Vec<u8>,
    /// True when the line hit `max_length` and was force-split, or came from `flush()`
    pub incomplete: bool,
}

/// Splits a byte stream on `\n`, dropping a trailing `\r` (CRLF links).
pub struct LineFramer {
    buffer: Vec<u8>,
    max_length: usize,
}

impl LineFramer {
    pub fn new(max_length: usize) -> Self {
        LineFramer {
            buffer: Vec::new(),
            max_length: max_length.max(1),
        }
    }

    /// Feed raw bytes into the framer.
    /// Returns any complete lines that were found. Empty lines are skipped.
    pub fn feed(&mut self, data: &[u8]) -> Vec<SerialFrame> {
        let mut frames = Vec::new();

        for &byte in data {
            if byte == LF {
                let mut line: Vec<u8> = self.buffer.drain(..).collect();
                if line.last() == Some(&CR) {
                    line.pop();
                }
                if !line.is_empty() {
                    frames.push(SerialFrame {
                        bytes: line,
                        incomplete: false,
                    });
                }
                continue;
            }

            self.buffer.push(byte);

            // Force split on max length
            if self.buffer.len() >= self.max_length {
                frames.push(SerialFrame {
                    bytes: self.buffer.drain(..).collect(),
                    incomplete: true,
                });
            }
        }

        frames
    }

    /// Number of bytes buffered without a terminator yet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Flush any remaining buffered data as an incomplete line.
    pub fn flush(&mut self) -> Option<SerialFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(SerialFrame {
            bytes: self.buffer.drain(..).collect(),
            incomplete: true,
        })
    }
}
