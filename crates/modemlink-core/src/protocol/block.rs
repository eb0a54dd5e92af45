//! Block encoding/decoding
//!
//! Wire layout shared by XMODEM and YMODEM:
//! - 1 byte: SOH (128-byte payload) or STX (1024-byte payload)
//! - 1 byte: Block number (mod 256)
//! - 1 byte: Ones' complement of the block number
//! - N bytes: Payload
//! - 1 byte checksum, or 2 bytes CRC-16-CCITT (big-endian)

use byteorder::{BigEndian, ByteOrder};

use super::{FrameError, ACK, CAN, CRC_REQUEST, EOT, NAK, SOH, STREAM_REQUEST, STX};
use crate::checksum::crc16_ccitt_update;

/// Payload size of a data block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSize {
    /// 128-byte block, SOH marker
    Standard,
    /// 1024-byte block, STX marker
    OneK,
}

impl BlockSize {
    /// Payload length in bytes
    pub fn len(self) -> usize {
        match self {
            BlockSize::Standard => 128,
            BlockSize::OneK => 1024,
        }
    }

    /// Start-of-block marker byte
    pub fn marker(self) -> u8 {
        match self {
            BlockSize::Standard => SOH,
            BlockSize::OneK => STX,
        }
    }

    /// Block size announced by a marker byte
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            SOH => Some(BlockSize::Standard),
            STX => Some(BlockSize::OneK),
            _ => None,
        }
    }

    /// Smallest block size that holds `len` bytes
    pub fn fitting(len: usize) -> Self {
        if len <= 128 {
            BlockSize::Standard
        } else {
            BlockSize::OneK
        }
    }
}

/// Block check trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailer {
    /// 1-byte arithmetic checksum
    Checksum,
    /// 2-byte CRC-16-CCITT
    Crc16,
}

impl Trailer {
    /// Trailer length in bytes
    pub fn len(self) -> usize {
        match self {
            Trailer::Checksum => 1,
            Trailer::Crc16 => 2,
        }
    }

    /// Compute the block check value over a payload
    pub fn compute(self, payload: &[u8]) -> u16 {
        match self {
            Trailer::Checksum => payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) as u16,
            Trailer::Crc16 => crc16_ccitt_update(0, payload),
        }
    }

    fn read(self, bytes: &[u8]) -> u16 {
        match self {
            Trailer::Checksum => bytes[0] as u16,
            Trailer::Crc16 => BigEndian::read_u16(bytes),
        }
    }

    fn write(self, value: u16, out: &mut Vec<u8>) {
        match self {
            Trailer::Checksum => out.push(value as u8),
            Trailer::Crc16 => {
                let mut crc_bytes = [0u8; 2];
                BigEndian::write_u16(&mut crc_bytes, value);
                out.extend_from_slice(&crc_bytes);
            }
        }
    }
}

/// Single-byte control codes exchanged between blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Block accepted
    Ack,
    /// Block rejected, or checksum-mode handshake
    Nak,
    /// Cancel transfer
    Can,
    /// End of file
    Eot,
    /// CRC-mode handshake ('C')
    CrcRequest,
    /// Streaming-mode handshake ('G')
    StreamRequest,
}

impl Control {
    /// Wire byte
    pub fn byte(self) -> u8 {
        match self {
            Control::Ack => ACK,
            Control::Nak => NAK,
            Control::Can => CAN,
            Control::Eot => EOT,
            Control::CrcRequest => CRC_REQUEST,
            Control::StreamRequest => STREAM_REQUEST,
        }
    }

    /// Parse a control byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ACK => Some(Control::Ack),
            NAK => Some(Control::Nak),
            CAN => Some(Control::Can),
            EOT => Some(Control::Eot),
            CRC_REQUEST => Some(Control::CrcRequest),
            STREAM_REQUEST => Some(Control::StreamRequest),
            _ => None,
        }
    }
}

/// One protocol data block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    number: u8,
    payload: Vec<u8>,
}

impl Block {
    /// Create a block from `data`, padding the payload up to `size` with `pad`.
    ///
    /// # Panics
    ///
    /// Panics if `data` is longer than the block size.
    pub fn padded(number: u8, data: &[u8], size: BlockSize, pad: u8) -> Self {
        assert!(
            data.len() <= size.len(),
            "block data of {} bytes exceeds {}-byte block",
            data.len(),
            size.len()
        );
        let mut payload = Vec::with_capacity(size.len());
        payload.extend_from_slice(data);
        payload.resize(size.len(), pad);
        Self { number, payload }
    }

    /// Block number (mod 256)
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Full payload including any padding
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the block, returning its payload
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Payload size of this block
    pub fn size(&self) -> BlockSize {
        BlockSize::fitting(self.payload.len())
    }

    /// Get the total encoded size
    pub fn encoded_size(&self, trailer: Trailer) -> usize {
        3 + self.payload.len() + trailer.len()
    }
}

/// Encode a block to wire bytes
pub fn encode(block: &Block, trailer: Trailer) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(block.encoded_size(trailer));
    bytes.push(block.size().marker());
    bytes.push(block.number);
    bytes.push(!block.number);
    bytes.extend_from_slice(&block.payload);
    trailer.write(trailer.compute(&block.payload), &mut bytes);
    bytes
}

/// Decode a block from wire bytes.
///
/// `Incomplete` means the caller should read `needed` more bytes and retry.
pub fn decode(data: &[u8], trailer: Trailer) -> Result<Block, FrameError> {
    let Some(&marker) = data.first() else {
        return Err(FrameError::Incomplete { needed: 1 });
    };
    let size = BlockSize::from_marker(marker).ok_or(FrameError::InvalidMarker(marker))?;

    let total = 3 + size.len() + trailer.len();
    if data.len() < total {
        return Err(FrameError::Incomplete {
            needed: total - data.len(),
        });
    }

    let number = data[1];
    let complement = data[2];
    if number != !complement {
        return Err(FrameError::SequenceComplement { number, complement });
    }

    let payload = &data[3..3 + size.len()];
    let received = trailer.read(&data[3 + size.len()..total]);
    let expected = trailer.compute(payload);
    if received != expected {
        return Err(FrameError::ChecksumMismatch {
            expected,
            actual: received,
        });
    }

    Ok(Block {
        number,
        payload: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SUB;

    #[test]
    fn test_block_roundtrip_crc() {
        let block = Block::padded(1, b"hello", BlockSize::Standard, SUB);
        let encoded = encode(&block, Trailer::Crc16);
        assert_eq!(encoded.len(), 133);
        assert_eq!(&encoded[..3], &[SOH, 0x01, 0xFE]);

        let decoded = decode(&encoded, Trailer::Crc16).expect("Should decode successfully");
        assert_eq!(decoded, block);
        assert_eq!(&decoded.payload()[5..8], &[SUB, SUB, SUB]);
    }

    #[test]
    fn test_one_k_block_uses_stx() {
        let block = Block::padded(2, &[0x55; 1000], BlockSize::OneK, 0);
        let encoded = encode(&block, Trailer::Crc16);
        assert_eq!(encoded[0], STX);
        assert_eq!(encoded.len(), 1029);
    }

    #[test]
    fn test_checksum_trailer_is_one_byte() {
        let block = Block::padded(3, &[1, 2, 3], BlockSize::Standard, 0);
        let encoded = encode(&block, Trailer::Checksum);
        assert_eq!(encoded.len(), 132);
        assert_eq!(encoded[131], 6);
    }

    #[test]
    fn test_crc_verification() {
        let block = Block::padded(1, &[1, 2, 3, 4, 5], BlockSize::Standard, 0);
        let mut encoded = encode(&block, Trailer::Crc16);

        // Corrupt a payload byte
        encoded[10] ^= 0xFF;

        assert!(matches!(
            decode(&encoded, Trailer::Crc16),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_marker() {
        assert_eq!(
            decode(&[0x7F, 1, 0xFE], Trailer::Crc16),
            Err(FrameError::InvalidMarker(0x7F))
        );
    }

    #[test]
    fn test_incomplete_reports_missing_bytes() {
        let block = Block::padded(1, b"abc", BlockSize::Standard, 0);
        let encoded = encode(&block, Trailer::Crc16);
        assert_eq!(
            decode(&encoded[..100], Trailer::Crc16),
            Err(FrameError::Incomplete { needed: 33 })
        );
        assert_eq!(
            decode(&[], Trailer::Crc16),
            Err(FrameError::Incomplete { needed: 1 })
        );
    }

    #[test]
    fn test_bad_complement() {
        let block = Block::padded(9, b"abc", BlockSize::Standard, 0);
        let mut encoded = encode(&block, Trailer::Checksum);
        encoded[2] = 0x00;
        assert_eq!(
            decode(&encoded, Trailer::Checksum),
            Err(FrameError::SequenceComplement {
                number: 9,
                complement: 0
            })
        );
    }

    #[test]
    fn test_control_bytes() {
        for control in [
            Control::Ack,
            Control::Nak,
            Control::Can,
            Control::Eot,
            Control::CrcRequest,
            Control::StreamRequest,
        ] {
            assert_eq!(Control::from_byte(control.byte()), Some(control));
        }
        assert_eq!(Control::from_byte(0x00), None);
    }

    #[test]
    #[should_panic]
    fn test_oversized_data_panics() {
        let _ = Block::padded(1, &[0u8; 129], BlockSize::Standard, 0);
    }
}
