//! Buffered, deadline-aware access to a [`Channel`]

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::trace;

use super::{Channel, TransferError, CAN};

/// Borrowed channel plus bytes read ahead but not yet consumed
pub(crate) struct Link<'a, C: Channel + ?Sized> {
    channel: &'a mut C,
    pending: VecDeque<u8>,
}

impl<'a, C: Channel + ?Sized> Link<'a, C> {
    pub(crate) fn new(channel: &'a mut C) -> Self {
        Self {
            channel,
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.channel.is_abort_requested()
    }

    /// Pull more bytes into the pending queue, waiting at most `timeout`.
    /// Returns false if nothing arrived.
    fn fill(&mut self, timeout: Duration) -> Result<bool, TransferError> {
        match self.channel.read(timeout)? {
            Some(bytes) if !bytes.is_empty() => {
                trace!("rx {} bytes: {:02x?}", bytes.len(), &bytes[..bytes.len().min(8)]);
                self.pending.extend(bytes);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Next byte, or `None` if the deadline passes first
    pub(crate) fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, TransferError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Ok(Some(byte));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.fill(remaining)? && Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    /// Exactly `count` bytes, or `None` if the line goes idle for `idle`
    /// before they all arrive. On timeout the partial data is discarded.
    pub(crate) fn read_exact(
        &mut self,
        count: usize,
        idle: Duration,
    ) -> Result<Option<Vec<u8>>, TransferError> {
        let mut deadline = Instant::now() + idle;
        while self.pending.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.fill(remaining)? {
                deadline = Instant::now() + idle;
            } else if Instant::now() >= deadline {
                self.pending.clear();
                return Ok(None);
            }
        }
        Ok(Some(self.pending.drain(..count).collect()))
    }

    /// Non-blocking check for an already-arrived byte
    pub(crate) fn poll_byte(&mut self) -> Result<Option<u8>, TransferError> {
        if self.pending.is_empty() {
            self.fill(Duration::ZERO)?;
        }
        Ok(self.pending.pop_front())
    }

    /// Discard input until the line has been quiet for `quiet`
    pub(crate) fn purge(&mut self, quiet: Duration) -> Result<usize, TransferError> {
        let mut discarded = self.pending.len();
        self.pending.clear();
        while self.fill(quiet)? {
            discarded += self.pending.len();
            self.pending.clear();
        }
        if discarded > 0 {
            trace!("purged {} bytes", discarded);
        }
        Ok(discarded)
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        let written = self.channel.write(bytes)?;
        if written != bytes.len() {
            return Err(TransferError::ShortWrite {
                expected: bytes.len(),
                written,
            });
        }
        Ok(())
    }

    pub(crate) fn send_control(&mut self, byte: u8) -> Result<(), TransferError> {
        self.write_all(&[byte])
    }

    /// Send the double CAN used to cancel a transfer
    pub(crate) fn send_cancel(&mut self) -> Result<(), TransferError> {
        self.write_all(&[CAN, CAN])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::memory_pair;
    use std::io;

    struct ShortChannel;

    impl Channel for ShortChannel {
        fn read(&mut self, _timeout: Duration) -> io::Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            Ok(bytes.len().saturating_sub(1))
        }
    }

    #[test]
    fn test_read_byte_splits_chunks() {
        let (mut a, mut b) = memory_pair();
        a.write(&[1, 2, 3]).unwrap();
        let mut link = Link::new(&mut b);
        let timeout = Duration::from_millis(50);
        assert_eq!(link.read_byte(timeout).unwrap(), Some(1));
        assert_eq!(link.read_exact(2, timeout).unwrap(), Some(vec![2, 3]));
        assert_eq!(link.read_byte(Duration::from_millis(5)).unwrap(), None);
    }

    #[test]
    fn test_read_exact_times_out() {
        let (mut a, mut b) = memory_pair();
        a.write(&[1]).unwrap();
        let mut link = Link::new(&mut b);
        assert_eq!(link.read_exact(4, Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn test_purge_discards_noise() {
        let (mut a, mut b) = memory_pair();
        a.write(&[9; 10]).unwrap();
        let mut link = Link::new(&mut b);
        assert_eq!(link.purge(Duration::from_millis(10)).unwrap(), 10);
        assert_eq!(link.poll_byte().unwrap(), None);
    }

    #[test]
    fn test_short_write_is_error() {
        let mut channel = ShortChannel;
        let mut link = Link::new(&mut channel);
        let err = link.write_all(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            TransferError::ShortWrite {
                expected: 3,
                written: 2
            }
        ));
    }
}
