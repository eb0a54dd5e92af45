//! Transfer session state and results

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{HeaderError, TransferError};

/// Which side of the transfer this session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    /// Sends blocks
    Sender,
    /// Receives blocks
    Receiver,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Created, nothing exchanged yet
    Init,
    /// Waiting for (or sending) the handshake byte
    AwaitHandshake,
    /// Header and data blocks in flight
    ExchangingBlocks,
    /// EOT sent or received, waiting for it to settle
    AwaitEotAck,
    /// Finished successfully
    Done,
    /// Stopped by the local abort signal
    Aborted,
    /// Stopped by a fatal error
    Failed,
}

/// Snapshot delivered to the progress callback after each acknowledged block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    /// File currently being transferred, if known
    pub file_name: Option<String>,
    /// Declared length of the current file, if known
    pub file_length: Option<u64>,
    /// Data blocks completed in the current file
    pub blocks: u64,
    /// Data bytes completed in the current file
    pub bytes: u64,
}

/// Per-file result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// File name (from the header, or the local name for XMODEM)
    pub name: Option<String>,
    /// Bytes delivered
    pub bytes: u64,
}

/// Totals for a completed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    /// Files transferred, in order
    pub files: Vec<FileReport>,
    /// Data blocks exchanged across all files
    pub blocks: u64,
    /// Data bytes delivered across all files
    pub bytes: u64,
    /// Retries (NAKs and timeouts) across the whole session
    pub retries: u64,
    /// Wall-clock duration
    pub elapsed: Duration,
}

/// How a transfer ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Every file went through
    Completed(TransferSummary),
    /// The local abort signal stopped the transfer; CAN was sent
    Aborted,
}

impl TransferOutcome {
    /// True on successful completion
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed(_))
    }

    /// Summary, if the transfer completed
    pub fn summary(&self) -> Option<&TransferSummary> {
        match self {
            TransferOutcome::Completed(summary) => Some(summary),
            TransferOutcome::Aborted => None,
        }
    }
}

/// Early exit from the state machine, carried through `?`
#[derive(Debug)]
pub(crate) enum Halt {
    Aborted,
    Failed(TransferError),
}

impl From<TransferError> for Halt {
    fn from(err: TransferError) -> Self {
        Halt::Failed(err)
    }
}

impl From<HeaderError> for Halt {
    fn from(err: HeaderError) -> Self {
        Halt::Failed(err.into())
    }
}

/// Mutable state of one transfer session
#[derive(Debug)]
pub struct TransferSession {
    role: Role,
    state: SessionState,
    started: Instant,
    /// Next block number to send or expect
    pub(crate) block_number: u8,
    /// Consecutive failures in the current exchange
    pub(crate) retries: u32,
    total_retries: u64,
    file_name: Option<String>,
    file_length: Option<u64>,
    file_blocks: u64,
    file_bytes: u64,
    total_blocks: u64,
    total_bytes: u64,
    files: Vec<FileReport>,
}

impl TransferSession {
    /// Start a new session
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: SessionState::Init,
            started: Instant::now(),
            block_number: 1,
            retries: 0,
            total_retries: 0,
            file_name: None,
            file_length: None,
            file_blocks: 0,
            file_bytes: 0,
            total_blocks: 0,
            total_bytes: 0,
            files: Vec::new(),
        }
    }

    /// Role of this session
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Total retries so far
    pub fn total_retries(&self) -> u64 {
        self.total_retries
    }

    pub(crate) fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("{:?}: {:?} -> {:?}", self.role, self.state, next);
            self.state = next;
        }
    }

    /// Count a failed attempt; true while still within `max_retries`
    pub(crate) fn record_retry(&mut self, max_retries: u32) -> bool {
        self.retries += 1;
        self.total_retries += 1;
        self.retries < max_retries
    }

    pub(crate) fn reset_retries(&mut self) {
        self.retries = 0;
    }

    /// Begin a new file; data blocks restart at 1
    pub(crate) fn begin_file(&mut self, name: Option<String>, length: Option<u64>) {
        self.file_name = name;
        self.file_length = length;
        self.file_blocks = 0;
        self.file_bytes = 0;
        self.block_number = 1;
        self.retries = 0;
    }

    /// Record a completed data block of `bytes` useful bytes
    pub(crate) fn complete_block(&mut self, bytes: u64) {
        self.file_blocks += 1;
        self.file_bytes += bytes;
        self.total_blocks += 1;
        self.total_bytes += bytes;
        self.block_number = self.block_number.wrapping_add(1);
        self.retries = 0;
    }

    /// Close the current file, reporting `bytes` delivered
    pub(crate) fn finish_file(&mut self, bytes: u64) {
        self.files.push(FileReport {
            name: self.file_name.take(),
            bytes,
        });
        // Pad stripping or truncation may deliver fewer bytes than were framed
        self.total_bytes = self.total_bytes - self.file_bytes + bytes;
        self.file_bytes = 0;
        self.file_blocks = 0;
        self.file_length = None;
    }

    pub(crate) fn progress(&self) -> ProgressReport {
        ProgressReport {
            file_name: self.file_name.clone(),
            file_length: self.file_length,
            blocks: self.file_blocks,
            bytes: self.file_bytes,
        }
    }

    pub(crate) fn summary(&self) -> TransferSummary {
        TransferSummary {
            files: self.files.clone(),
            blocks: self.total_blocks,
            bytes: self.total_bytes,
            retries: self.total_retries,
            elapsed: self.started.elapsed(),
        }
    }
}
