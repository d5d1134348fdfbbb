//! Byte transports to a DW1000 module and the newline framing on top of them.

use log::debug;
use serial2::SerialPort;

use std::{
    fmt, io,
    path::PathBuf,
    time::{Duration, Instant},
};

/// How long a single blocking read on a serial port may take before we get
/// a chance to look at the caller's deadline again.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Failures of the byte transport underneath a module.
#[derive(Debug)]
pub enum LinkError {
    /// The OS refused a read, a write or a discard.
    IoError(io::Error),
    /// The port reported end of stream, the cable is most likely gone.
    Disconnected,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::IoError(error) => write!(f, "io error: {}", error),
            LinkError::Disconnected => write!(f, "device disconnected"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<io::Error> for LinkError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

/// A raw byte pipe to one module.
///
/// `read_bytes` must not block much longer than [`POLL_TIMEOUT`]; returning
/// `Ok(0)` means nothing arrived yet.
pub trait LineLink {
    /// Send all of `buf`.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), LinkError>;
    /// Copy whatever has arrived into `buf`, returning how many bytes.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;
    /// Throw away anything the OS has buffered but we have not read.
    fn discard_input(&mut self) -> Result<(), LinkError>;
}

/// A module attached to a USB-to-serial port.
pub struct SerialLink {
    port: SerialPort,
}

impl SerialLink {
    /// Open `path` at `baud_rate`.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, LinkError> {
        debug!("Opening serial port {} at {} baud", path, baud_rate);
        let mut port = SerialPort::open(path, baud_rate)?;
        port.set_read_timeout(POLL_TIMEOUT)?;
        Ok(Self { port })
    }

    /// Every serial port the OS knows about.
    pub fn available_ports() -> Result<Vec<PathBuf>, LinkError> {
        Ok(SerialPort::available_ports()?)
    }
}

impl LineLink for SerialLink {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), LinkError> {
        self.port.write_all(buf)?;
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self.port.read(buf) {
            Ok(0) => Err(LinkError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        self.port.discard_input_buffer()?;
        Ok(())
    }
}

/// Splits the byte stream of a [`LineLink`] into lines.
pub struct LineReader<L: LineLink> {
    link: L,
    read_buf: Vec<u8>,
}

impl<L: LineLink> LineReader<L> {
    /// Start with an empty line buffer.
    pub fn new(link: L) -> Self {
        Self {
            link,
            read_buf: Vec::new(),
        }
    }

    /// The transport underneath.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// The transport underneath, mutably.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Drop any partial line and everything still queued on the link, so the
    /// next line read was produced after this call.
    pub fn resync(&mut self) -> Result<(), LinkError> {
        self.read_buf.clear();
        self.link.discard_input()
    }

    /// Send a command as is.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), LinkError> {
        self.link.write_bytes(buf)
    }

    /// Read one `\n` terminated line, including its line ending, or `None`
    /// if `deadline` passes first. Bytes that are not valid UTF-8 are
    /// dropped; there is often garbage on the line right after a port opens.
    ///
    /// A line that is already complete in the buffer is returned even when
    /// `deadline` has passed.
    pub fn read_line(&mut self, deadline: Instant) -> Result<Option<String>, LinkError> {
        let mut buffer = [0; 256];

        loop {
            if let Some(pos) = self.read_buf.iter().position(|&c| c == b'\n') {
                let line: Vec<u8> = self.read_buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line).replace('\u{FFFD}', "");
                return Ok(Some(line));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let read_len = self.link.read_bytes(&mut buffer)?;
            self.read_buf.extend_from_slice(&buffer[..read_len]);
        }
    }
}
