//! Byte channel abstraction
//!
//! The transfer engine only needs a duplex byte stream with timed reads.
//! Serial ports, sockets and in-memory pipes all fit behind [`Channel`].

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

/// Duplex byte channel consumed by the transfer engine
pub trait Channel {
    /// Read whatever bytes are available, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. Must not block past
    /// the timeout.
    fn read(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>>;

    /// Write bytes, returning how many were accepted
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Transport-level abort request, polled between blocks
    fn is_abort_requested(&self) -> bool {
        false
    }
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn read(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        (**self).read(timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        (**self).write(bytes)
    }

    fn is_abort_requested(&self) -> bool {
        (**self).is_abort_requested()
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn read(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        (**self).read(timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        (**self).write(bytes)
    }

    fn is_abort_requested(&self) -> bool {
        (**self).is_abort_requested()
    }
}

/// Cooperative abort flag shared between the caller and a running transfer
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Create a cleared signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running transfer to stop at the next block boundary
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether an abort has been requested
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Reset the signal so it can be reused for another transfer
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One end of an in-memory loopback pair
pub struct MemoryChannel {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Create two connected in-memory channels.
///
/// Bytes written to one end are read from the other. Once an end is dropped
/// the survivor sees `BrokenPipe` after draining buffered data.
pub fn memory_pair() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, b_rx) = unbounded();
    let (b_tx, a_rx) = unbounded();
    (
        MemoryChannel { tx: a_tx, rx: a_rx },
        MemoryChannel { tx: b_tx, rx: b_rx },
    )
}

impl Channel for MemoryChannel {
    fn read(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        let first = match self.rx.recv_timeout(timeout) {
            Ok(bytes) => bytes,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "memory channel peer disconnected",
                ))
            }
        };

        // Coalesce anything else already queued
        let mut bytes = first;
        while let Ok(more) = self.rx.try_recv() {
            bytes.extend_from_slice(&more);
        }
        Ok(Some(bytes))
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.tx.send(bytes.to_vec()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory channel peer disconnected",
            )
        })?;
        Ok(bytes.len())
    }
}
