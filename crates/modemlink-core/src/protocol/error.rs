//! Protocol errors

use std::fmt;
use std::io;

use thiserror::Error;

/// Errors raised while parsing a single block off the wire.
///
/// These are local and recoverable: the receiver answers them with a NAK
/// (or keeps reading, for `Incomplete`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid block marker: {0:#04x}")]
    InvalidMarker(u8),

    #[error("Block number {number:#04x} does not match complement {complement:#04x}")]
    SequenceComplement { number: u8, complement: u8 },

    #[error("Block check mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Incomplete block: {needed} more bytes needed")]
    Incomplete { needed: usize },
}

/// Errors raised while parsing a YMODEM header block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("File name is not NUL-terminated")]
    MissingTerminator,

    #[error("File name '{0}' has no usable final component")]
    UnusableName(String),

    #[error("File name is not valid UTF-8")]
    InvalidName,

    #[error("Invalid {field} field: '{value}'")]
    InvalidField { field: &'static str, value: String },
}

/// Point in the exchange where a transfer gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for (or sending) the initial handshake byte
    Handshake,
    /// YMODEM header block exchange
    Header,
    /// Data block exchange
    Block(u8),
    /// End-of-file EOT exchange
    EndOfFile,
    /// YMODEM end-of-batch header exchange
    EndOfBatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Handshake => write!(f, "handshake"),
            Stage::Header => write!(f, "header block"),
            Stage::Block(n) => write!(f, "block {}", n),
            Stage::EndOfFile => write!(f, "end of file"),
            Stage::EndOfBatch => write!(f, "end of batch"),
        }
    }
}

/// Errors that terminate a transfer session
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Timed out during {stage} after {attempts} attempts")]
    Timeout { stage: Stage, attempts: u32 },

    #[error("Transfer cancelled by peer")]
    PeerCancelled,

    #[error("Channel I/O error: {0}")]
    Channel(#[from] io::Error),

    #[error("Short write on channel: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("File I/O error: {0}")]
    File(#[source] io::Error),

    #[error("Block out of sequence: expected {expected:#04x}, got {received:#04x}")]
    OutOfSequence { expected: u8, received: u8 },

    #[error("Invalid file header: {0}")]
    InvalidHeader(#[from] HeaderError),

    #[error("Streaming transfer corrupted: {0}")]
    StreamCorrupted(FrameError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl TransferError {
    /// Whether a CAN sequence should be sent to the peer before giving up.
    ///
    /// Not attempted when the channel itself failed or the peer already cancelled.
    pub(crate) fn should_notify_peer(&self) -> bool {
        !matches!(
            self,
            TransferError::PeerCancelled
                | TransferError::Channel(_)
                | TransferError::ShortWrite { .. }
                | TransferError::InvalidArgument(_)
        )
    }
}
