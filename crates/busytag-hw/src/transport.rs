//! Line-oriented transport over the Busy Tag's USB CDC serial port.

use crate::protocol::LINE_TERMINATOR;
use crate::{Error, Result};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, info};

/// Default baud rate. CDC ignores it, but the port must be opened with one.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// How long a single blocking read may wait before the deadline is re-checked.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Size of each read from the port.
const READ_CHUNK: usize = 256;

/// Upper bound on how long stale input is drained before a command.
const DISCARD_LIMIT: Duration = Duration::from_millis(500);

/// Byte-level access to the device used by the command layer.
pub trait Transport {
    /// Sends one command followed by the line terminator.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Sends raw bytes (file contents).
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Blocks until a terminated line arrives or `timeout` elapses.
    ///
    /// The returned line has its terminator stripped.
    fn read_line(&mut self, timeout: Duration) -> Result<String>;

    /// Reads exactly `len` raw bytes (file contents).
    ///
    /// `timeout` bounds the wait for each piece of the data, not the whole
    /// transfer, so a slow but steady stream never times out.
    fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Drops buffered input and anything the device is still sending.
    ///
    /// Used after a timeout so a late reply is not taken as the answer to
    /// the next command.
    fn discard_input(&mut self) -> Result<()>;
}

/// Transport over a serial port or any blocking byte stream.
///
/// Bytes received past the end of a line are kept for the next read, so a
/// timed out read leaves the transport usable.
pub struct SerialTransport<S = Box<dyn SerialPort>> {
    stream: S,
    rx: Vec<u8>,
}

impl SerialTransport {
    /// Opens the serial port at `path`.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| {
                // Report a missing device distinctly from other open failures
                if matches!(
                    e.kind,
                    tokio_serial::ErrorKind::NoDevice | tokio_serial::ErrorKind::Io(_)
                ) && !std::path::Path::new(path).exists()
                {
                    return Error::DeviceNotFound(path.to_string());
                }
                Error::Serial(e)
            })?;

        // Drop anything the device printed before we connected
        port.clear(ClearBuffer::Input)?;

        info!("Opened Busy Tag serial port {} at {} baud", path, baud_rate);
        Ok(Self::from_stream(port))
    }
}

impl<S: Read + Write> SerialTransport<S> {
    /// Wraps an already opened stream.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream,
            rx: Vec::new(),
        }
    }

    /// Releases the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Reads one chunk into the receive buffer, waiting no later than `deadline`.
    fn fill(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(n) if n > 0 => {
                    self.rx.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Ok(_) => return Err(Error::Io(ErrorKind::UnexpectedEof.into())),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(Error::Timeout(timeout));
            }
        }
    }
}

impl<S: Read + Write> Transport for SerialTransport<S> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        debug!("-> {}", line);
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(LINE_TERMINATOR.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        debug!("-> <{} bytes>", data.len());
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = self.rx.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.rx.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                debug!("<- {}", line);
                return Ok(line);
            }
            self.fill(deadline, timeout)?;
        }
    }

    fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        while self.rx.len() < len {
            self.fill(Instant::now() + timeout, timeout)?;
        }
        let data: Vec<u8> = self.rx.drain(..len).collect();
        debug!("<- <{} bytes>", data.len());
        Ok(data)
    }

    fn discard_input(&mut self) -> Result<()> {
        let mut discarded = self.rx.len();
        self.rx.clear();

        // Read until the line goes quiet for one poll interval
        let deadline = Instant::now() + DISCARD_LIMIT;
        let mut chunk = [0u8; READ_CHUNK];
        while Instant::now() < deadline {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) => return Err(e.into()),
            }
        }

        if discarded > 0 {
            debug!("Discarded {} stale bytes", discarded);
        }
        Ok(())
    }
}


/// In-memory byte stream for exercising [`SerialTransport`] without a port.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;
    use std::io::{ErrorKind, Read, Write};
    use std::time::Duration;

    enum Chunk {
        Data(Vec<u8>),
        /// A read that returns no data.
        Stall,
        /// A read that blocks for a while, then returns no data.
        Delay(Duration),
        Eof,
    }

    #[derive(Default)]
    pub struct FakeStream {
        chunks: VecDeque<Chunk>,
        pub written: Vec<u8>,
    }

    impl FakeStream {
        pub fn push(&mut self, data: &[u8]) -> &mut Self {
            self.chunks.push_back(Chunk::Data(data.to_vec()));
            self
        }

        pub fn stall(&mut self) -> &mut Self {
            self.chunks.push_back(Chunk::Stall);
            self
        }

        pub fn delay(&mut self, duration: Duration) -> &mut Self {
            self.chunks.push_back(Chunk::Delay(duration));
            self
        }

        pub fn eof(&mut self) -> &mut Self {
            self.chunks.push_back(Chunk::Eof);
            self
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Chunk::Data(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.chunks.push_front(Chunk::Data(data[n..].to_vec()));
                    }
                    Ok(n)
                }
                Some(Chunk::Eof) => Ok(0),
                Some(Chunk::Delay(duration)) => {
                    std::thread::sleep(duration);
                    Err(std::io::Error::new(ErrorKind::TimedOut, "delayed"))
                }
                Some(Chunk::Stall) | None => {
                    Err(std::io::Error::new(ErrorKind::TimedOut, "stalled"))
                }
            }
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeStream;
    use super::*;

    #[test]
    fn test_write_line_appends_crlf() {
        let mut transport = SerialTransport::from_stream(FakeStream::default());
        transport.write_line("AT+GDN").unwrap();
        assert_eq!(transport.into_inner().written, b"AT+GDN\r\n");
    }

    #[test]
    fn test_read_line_across_chunks() {
        let mut stream = FakeStream::default();
        stream.push(b"+DN:busy");
        stream.push(b"tag\r\nOK\r\n");
        let mut transport = SerialTransport::from_stream(stream);

        let timeout = Duration::from_millis(10);
        assert_eq!(transport.read_line(timeout).unwrap(), "+DN:busytag");
        assert_eq!(transport.read_line(timeout).unwrap(), "OK");
    }

    #[test]
    fn test_timeout_keeps_partial_line() {
        let mut stream = FakeStream::default();
        stream.push(b"+FSS:12");
        stream.stall();
        stream.push(b"34\r\n");
        let mut transport = SerialTransport::from_stream(stream);

        let err = transport.read_line(Duration::ZERO).unwrap_err();
        assert!(err.is_timeout());

        // The bytes received before the timeout are still buffered
        let line = transport.read_line(Duration::from_millis(10)).unwrap();
        assert_eq!(line, "+FSS:1234");
    }

    #[test]
    fn test_timeout_then_recover() {
        let mut stream = FakeStream::default();
        stream.stall();
        stream.push(b"OK\r\n");
        let mut transport = SerialTransport::from_stream(stream);

        assert!(transport.read_line(Duration::ZERO).unwrap_err().is_timeout());
        assert_eq!(transport.read_line(Duration::from_millis(10)).unwrap(), "OK");
    }

    #[test]
    fn test_read_exact_uses_buffered_bytes() {
        let mut stream = FakeStream::default();
        stream.push(b"+GF:a.bin,4\r\n\x00\x01");
        stream.push(b"\x02\x03\r\nOK\r\n");
        let mut transport = SerialTransport::from_stream(stream);

        let timeout = Duration::from_millis(10);
        assert_eq!(transport.read_line(timeout).unwrap(), "+GF:a.bin,4");
        assert_eq!(transport.read_exact(4, timeout).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(transport.read_line(timeout).unwrap(), "");
        assert_eq!(transport.read_line(timeout).unwrap(), "OK");
    }

    #[test]
    fn test_io_error_propagates() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"))
            }
        }
        impl Write for Broken {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut transport = SerialTransport::from_stream(Broken);
        let err = transport.read_line(Duration::from_millis(10)).unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn test_end_of_stream_is_connection_error() {
        let mut stream = FakeStream::default();
        stream.push(b"+DB:7").eof();
        let mut transport = SerialTransport::from_stream(stream);

        let err = transport.read_line(Duration::from_secs(5)).unwrap_err();
        assert!(err.is_connection());
        assert!(matches!(err, Error::Io(ref e) if e.kind() == ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_read_exact_slow_steady_stream() {
        // Six pieces, each well inside the timeout, the whole well past it
        let gap = Duration::from_millis(20);
        let mut stream = FakeStream::default();
        for piece in [b"ab", b"cd", b"ef", b"gh", b"ij", b"kl"] {
            stream.delay(gap).push(piece);
        }
        let mut transport = SerialTransport::from_stream(stream);

        let data = transport.read_exact(12, Duration::from_millis(60)).unwrap();
        assert_eq!(data, b"abcdefghijkl");
    }

    #[test]
    fn test_read_exact_times_out_when_idle() {
        let mut stream = FakeStream::default();
        stream.push(b"ab").delay(Duration::from_millis(20)).push(b"cd");
        let mut transport = SerialTransport::from_stream(stream);

        let err = transport.read_exact(4, Duration::from_millis(5)).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_discard_input_drops_stale_bytes() {
        let mut stream = FakeStream::default();
        stream
            .push(b"+DB:7")
            .stall()
            .push(b"5\r\n+SP:old.gif\r\n")
            .stall()
            .push(b"OK\r\n");
        let mut transport = SerialTransport::from_stream(stream);

        assert!(transport.read_line(Duration::ZERO).unwrap_err().is_timeout());
        transport.discard_input().unwrap();
        assert_eq!(transport.read_line(Duration::from_millis(10)).unwrap(), "OK");
    }
}
