//! Protocol and variant selection

use serde::{Deserialize, Serialize};

use super::{BlockSize, Trailer, TransferError, CRC_REQUEST, NAK, STREAM_REQUEST, SUB};
use crate::config::TransferConfig;

/// File transfer protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Single file, no metadata
    Xmodem,
    /// Batch of files with a header block per file
    Ymodem,
}

impl Protocol {
    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Xmodem => "XMODEM",
            Protocol::Ymodem => "YMODEM",
        }
    }
}

/// Block check / block size / flow variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// 128-byte blocks, 1-byte checksum
    Checksum,
    /// 128-byte blocks, CRC-16
    Crc,
    /// 1024-byte blocks, CRC-16
    #[serde(rename = "1k")]
    OneK,
    /// 1024-byte blocks, CRC-16, no per-block acknowledgment
    G,
}

impl Variant {
    /// Block size used for full data blocks
    pub fn block_size(self) -> BlockSize {
        match self {
            Variant::Checksum | Variant::Crc => BlockSize::Standard,
            Variant::OneK | Variant::G => BlockSize::OneK,
        }
    }

    /// Block check requested by this variant
    pub fn trailer(self) -> Trailer {
        match self {
            Variant::Checksum => Trailer::Checksum,
            Variant::Crc | Variant::OneK | Variant::G => Trailer::Crc16,
        }
    }

    /// Handshake byte a receiver sends to request this variant
    pub fn handshake(self) -> u8 {
        match self {
            Variant::Checksum => NAK,
            Variant::Crc | Variant::OneK => CRC_REQUEST,
            Variant::G => STREAM_REQUEST,
        }
    }

    /// Whether blocks are streamed without per-block ACK
    pub fn is_streaming(self) -> bool {
        matches!(self, Variant::G)
    }
}

/// Everything a transfer needs besides the channel and the files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Protocol to speak
    pub protocol: Protocol,
    /// Variant to request or offer
    pub variant: Variant,
    /// Text mode pads with CTRL-Z instead of NUL
    #[serde(default)]
    pub text_mode: bool,
    /// Timeouts and retry limits
    #[serde(default)]
    pub config: TransferConfig,
}

impl TransferOptions {
    /// Binary-mode options with default timeouts
    pub fn new(protocol: Protocol, variant: Variant) -> Self {
        Self {
            protocol,
            variant,
            text_mode: false,
            config: TransferConfig::default(),
        }
    }

    /// Select text or binary mode
    pub fn with_text_mode(mut self, text_mode: bool) -> Self {
        self.text_mode = text_mode;
        self
    }

    /// Replace timeouts and retry limits
    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    /// Byte used to fill the unused tail of the last block
    pub fn pad_byte(&self) -> u8 {
        if self.text_mode {
            SUB
        } else {
            0x00
        }
    }

    /// Reject option combinations no transfer can run with
    pub fn validate(&self) -> Result<(), TransferError> {
        self.config
            .validate()
            .map_err(|e| TransferError::InvalidArgument(e.to_string()))
    }

    /// Label such as "YMODEM-1k" for log lines
    pub(crate) fn label(&self) -> String {
        let suffix = match self.variant {
            Variant::Checksum => "",
            Variant::Crc => "-CRC",
            Variant::OneK => "-1K",
            Variant::G => "-G",
        };
        format!("{}{}", self.protocol.name(), suffix)
    }
}
