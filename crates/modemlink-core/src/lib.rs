//! # ModemLink Core Library
//!
//! XMODEM and YMODEM file transfer over byte-stream links.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Checksum and CRC routines (8-bit sum, LRC, CRC-8 and four CRC-16 flavours)
//! - Block framing for 128-byte and 1K blocks
//! - Sender and receiver state machines with retry, duplicate and cancel handling
//! - A file driver plus a serial port transport
//!
//! ## Supported protocols
//!
//! - XMODEM (checksum, CRC, 1K)
//! - YMODEM batch (CRC, 1K, G streaming)
//!
//! ## Example
//!
//! ```rust,ignore
//! use modemlink_core::prelude::*;
//!
//! let mut port = open_port("/dev/ttyUSB0", Some(115200))?;
//! let options = TransferOptions::new(Protocol::Xmodem, Variant::Crc);
//! let outcome = receive_file(&mut port, "download.bin".as_ref(), &options, None, &AbortSignal::new())?;
//! if let Some(summary) = outcome.summary() {
//!     println!("{} bytes, {} retries", summary.bytes, summary.retries);
//! }
//! ```

pub mod checksum;
pub mod config;
pub mod protocol;
pub mod serial;
pub mod transfer;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::TransferConfig;
    pub use crate::protocol::{
        memory_pair, AbortSignal, Channel, FileHeader, ProgressReport, Protocol, TransferError,
        TransferOptions, TransferOutcome, TransferSummary, Variant,
    };
    pub use crate::serial::{open_port, SerialChannel};
    pub use crate::transfer::{receive_file, send_file, send_files};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
