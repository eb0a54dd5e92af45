//! XMODEM/YMODEM Transfer Protocols
//!
//! Implements the XMODEM and YMODEM file transfer protocols over an abstract
//! byte channel.
//!
//! Supports checksum, CRC-16, 1K and streaming (G) variants, plus YMODEM
//! batch transfers with file name, size and timestamp headers.

mod block;
pub mod channel;
mod error;
mod header;
mod link;
mod options;
mod receiver;
mod sender;
mod session;

pub use block::{decode, encode, Block, BlockSize, Control, Trailer};
pub use channel::{memory_pair, AbortSignal, Channel, MemoryChannel};
pub use error::{FrameError, HeaderError, Stage, TransferError};
pub use header::FileHeader;
pub use options::{Protocol, TransferOptions, Variant};
pub use receiver::{FileSink, MemorySink, ReceivedFile, Receiver};
pub use sender::{OutgoingFile, Sender};
pub use session::{
    FileReport, ProgressReport, Role, SessionState, TransferOutcome, TransferSession,
    TransferSummary,
};

/// Start of a 128-byte block
pub const SOH: u8 = 0x01;
/// Start of a 1024-byte block
pub const STX: u8 = 0x02;
/// End of transmission
pub const EOT: u8 = 0x04;
/// Acknowledge
pub const ACK: u8 = 0x06;
/// Negative acknowledge (also the checksum-mode handshake)
pub const NAK: u8 = 0x15;
/// Cancel
pub const CAN: u8 = 0x18;
/// CTRL-Z, pad byte for text-mode transfers
pub const SUB: u8 = 0x1A;
/// Receiver handshake requesting CRC-16 mode
pub const CRC_REQUEST: u8 = b'C';
/// Receiver handshake requesting streaming (G) mode
pub const STREAM_REQUEST: u8 = b'G';

/// Default per-attempt timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Default number of consecutive failures tolerated before a transfer fails
pub const DEFAULT_MAX_RETRIES: u32 = 10;
