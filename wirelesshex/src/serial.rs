//! Serial line contract and the buffering line reader.
//!
//! The relay talks to its controlling peer in newline-terminated ASCII
//! lines. [`LineBuffered`] adapts any byte port (the `serialport` crate's
//! ports on native platforms) into that shape, treating the port's read
//! timeout as "no data yet".

use log::warn;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Discard threshold for buffered bytes with no line terminator in sight.
const MAX_PENDING: usize = 4096;

/// Line-oriented serial link to the controlling peer.
pub trait SerialLine {
    /// Read one newline-terminated line, stripped of `\r\n`/`\n`.
    /// Returns `Ok(None)` when no complete line arrives within `timeout`.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Write one line followed by a newline.
    fn write_line(&mut self, line: &[u8]) -> Result<()>;
}

/// Buffering [`SerialLine`] implementation over any byte port.
///
/// The underlying port should be configured with a short read timeout;
/// `read_line` polls it until a full line or the caller's deadline.
pub struct LineBuffered<P> {
    port: P,
    pending: Vec<u8>,
}

impl<P: Read + Write> LineBuffered<P> {
    /// Wrap a byte port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            pending: Vec::new(),
        }
    }

    /// Consume the wrapper and return the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Pop a complete line off the pending buffer, if one is there.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }
}

impl<P: Read + Write> SerialLine for LineBuffered<P> {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            let mut buf = [0u8; 256];
            match self.port.read(&mut buf) {
                Ok(0) => {},
                Ok(n) => {
                    self.pending.extend_from_slice(&buf[..n]);
                    if self.pending.len() > MAX_PENDING {
                        warn!(
                            "discarding {} buffered bytes without a line terminator",
                            self.pending.len()
                        );
                        self.pending.clear();
                    }
                },
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {},
                Err(e) => return Err(Error::Io(e)),
            }

            if start.elapsed() >= timeout {
                return Ok(None);
            }
        }
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.port.write_all(line)?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }
}

/// Open a native serial port wrapped as a [`LineBuffered`] link.
///
/// The port gets a 50 ms read timeout so `read_line` can poll against its
/// caller's deadline.
#[cfg(feature = "native")]
pub fn open_port(
    port_name: &str,
    baud_rate: u32,
) -> Result<LineBuffered<Box<dyn serialport::SerialPort>>> {
    let port = serialport::new(port_name, baud_rate)
        .timeout(Duration::from_millis(50))
        .open()?;
    Ok(LineBuffered::new(port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Byte port fed from a script, timing out once drained.
    struct MockPort {
        read_buf: VecDeque<u8>,
        write_buf: Vec<u8>,
    }

    impl MockPort {
        fn new(data: &[u8]) -> Self {
            Self {
                read_buf: data.iter().copied().collect(),
                write_buf: Vec::new(),
            }
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.read_buf.is_empty() {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
            }
            // One byte per call, forcing reassembly across reads.
            buf[0] = self.read_buf.pop_front().unwrap();
            Ok(1)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.write_buf.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_line_reassembles_across_reads() {
        let mut line = LineBuffered::new(MockPort::new(b"FLX?OK\nFLX:0:OK\n"));
        let timeout = Duration::from_millis(100);
        assert_eq!(line.read_line(timeout).unwrap().unwrap(), b"FLX?OK");
        assert_eq!(line.read_line(timeout).unwrap().unwrap(), b"FLX:0:OK");
        assert_eq!(line.read_line(Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn test_read_line_strips_crlf() {
        let mut line = LineBuffered::new(MockPort::new(b"FLX?\r\n"));
        assert_eq!(
            line.read_line(Duration::from_millis(100)).unwrap().unwrap(),
            b"FLX?"
        );
    }

    #[test]
    fn test_read_line_empty_line() {
        let mut line = LineBuffered::new(MockPort::new(b"\n"));
        assert_eq!(
            line.read_line(Duration::from_millis(100)).unwrap().unwrap(),
            b""
        );
    }

    #[test]
    fn test_read_line_timeout_keeps_partial() {
        let mut line = LineBuffered::new(MockPort::new(b"FLX:0:10"));
        assert_eq!(line.read_line(Duration::from_millis(20)).unwrap(), None);
        // Partial input stays buffered for the next call.
        assert_eq!(line.pending, b"FLX:0:10");
    }

    #[test]
    fn test_write_line_appends_newline() {
        let mut line = LineBuffered::new(MockPort::new(b""));
        line.write_line(b"FLX:3:OK").unwrap();
        assert_eq!(line.into_inner().write_buf, b"FLX:3:OK\n");
    }
}
