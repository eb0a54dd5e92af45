//! Test channels shared by the integration tests
#![allow(dead_code)]

use modemlink_core::config::TransferConfig;
use modemlink_core::protocol::{
    encode, Block, BlockSize, Channel, MemoryChannel, Trailer, ACK,
};
use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::Duration;

/// Plays a peer from a script: every write releases the next reply
pub struct ScriptedChannel {
    inbox: VecDeque<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    pub written: Vec<Vec<u8>>,
}

impl ScriptedChannel {
    pub fn new(initial: Vec<u8>, replies: Vec<Vec<u8>>) -> Self {
        let mut inbox = VecDeque::new();
        if !initial.is_empty() {
            inbox.push_back(initial);
        }
        Self {
            inbox,
            replies: replies.into(),
            written: Vec::new(),
        }
    }

    /// Everything written, flattened
    pub fn all_written(&self) -> Vec<u8> {
        self.written.concat()
    }
}

impl Channel for ScriptedChannel {
    fn read(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        match self.inbox.pop_front() {
            Some(bytes) => Ok(Some(bytes)),
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.written.push(bytes.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            if !reply.is_empty() {
                self.inbox.push_back(reply);
            }
        }
        Ok(bytes.len())
    }
}

/// A peer that never answers
#[derive(Default)]
pub struct SilentChannel {
    pub written: Vec<Vec<u8>>,
}

impl Channel for SilentChannel {
    fn read(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        thread::sleep(timeout);
        Ok(None)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.written.push(bytes.to_vec());
        Ok(bytes.len())
    }
}

/// Wraps a memory channel and silently drops one outgoing ACK
pub struct LossyChannel {
    inner: MemoryChannel,
    drop_ack: usize,
    acks: usize,
}

impl LossyChannel {
    /// Drop the ACK with zero-based index `drop_ack`
    pub fn new(inner: MemoryChannel, drop_ack: usize) -> Self {
        Self {
            inner,
            drop_ack,
            acks: 0,
        }
    }
}

impl Channel for LossyChannel {
    fn read(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        self.inner.read(timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if bytes == &[ACK] {
            let index = self.acks;
            self.acks += 1;
            if index == self.drop_ack {
                return Ok(bytes.len());
            }
        }
        self.inner.write(bytes)
    }
}

/// Short timeouts so failure paths finish quickly
pub fn fast_config() -> TransferConfig {
    TransferConfig {
        handshake_timeout_ms: 20,
        response_timeout_ms: 20,
        char_timeout_ms: 20,
        purge_timeout_ms: 5,
        max_retries: 3,
        crc_handshake_attempts: 3,
    }
}

/// Deterministic test data that never ends in a pad byte
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 250) as u8 + 1).collect()
}

/// Wire bytes of a data block
pub fn frame(number: u8, data: &[u8], size: BlockSize, trailer: Trailer) -> Vec<u8> {
    encode(&Block::padded(number, data, size, 0), trailer)
}
