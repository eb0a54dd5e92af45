//! Serial port transport
//!
//! Adapts a [`serialport::SerialPort`] to the [`Channel`] contract used by the
//! transfer state machines.

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

use crate::protocol::{AbortSignal, Channel, TransferError};

/// Default baud rate when none is given
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Largest chunk returned by a single read
const READ_CHUNK: usize = 1100;

/// Shortest timeout handed to the driver; some platforms treat zero as "block forever"
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

fn to_io(e: serialport::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Serial port wrapper implementing [`Channel`]
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    abort: Option<AbortSignal>,
}

impl SerialChannel {
    /// Wrap an already opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port, abort: None }
    }

    /// Report `signal` through [`Channel::is_abort_requested`]
    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    /// Port name, if the driver knows it
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }

    /// Drop anything sitting in the driver's buffers
    pub fn clear_buffers(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(to_io)
    }
}

impl Channel for SerialChannel {
    fn read(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        if timeout.is_zero() && self.port.bytes_to_read().map_err(to_io)? == 0 {
            return Ok(None);
        }
        self.port
            .set_timeout(timeout.max(MIN_READ_TIMEOUT))
            .map_err(to_io)?;

        let mut buf = vec![0u8; READ_CHUNK];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let written = self.port.write(bytes)?;
        self.port.flush()?;
        Ok(written)
    }

    fn is_abort_requested(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortSignal::is_requested)
    }
}

/// Open a serial port for file transfer
///
/// The port is configured 8N1 without flow control and its buffers are
/// cleared so stale bytes cannot be mistaken for a handshake.
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<SerialChannel, TransferError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
    debug!("Opening {} at {} baud", name, baud);

    let mut port = serialport::new(name, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| TransferError::Channel(to_io(e)))?;

    // Keep DTR asserted; many targets reset when it drops
    if let Err(e) = port.write_data_terminal_ready(true) {
        warn!("Failed to set DTR on {}: {} (continuing)", name, e);
    }

    let mut channel = SerialChannel::new(port);
    channel.clear_buffers()?;
    Ok(channel)
}
