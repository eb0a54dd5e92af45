//! YMODEM header block (block 0)
//!
//! Payload layout: `name NUL length [SP mtime [SP mode]] NUL`, zero padded.
//! `length` is decimal, `mtime` (seconds since the Unix epoch) and `mode`
//! are octal. An all-zero payload ends a batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Block, BlockSize, HeaderError};

/// File metadata carried by a YMODEM header block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    /// File name as sent on the wire
    pub name: String,
    /// Exact file length in bytes
    pub length: Option<u64>,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
    /// Unix permission bits
    pub mode: Option<u32>,
}

impl FileHeader {
    /// Create a header with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length: None,
            modified: None,
            mode: None,
        }
    }

    /// Set the declared file length
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the modification time
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Set the permission bits
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Encode as block 0.
    ///
    /// Uses a 1K block when the fields do not fit in 128 bytes.
    /// Later fields are only written when every earlier one is present.
    pub fn to_block(&self) -> Block {
        let mut info = String::new();
        if let Some(length) = self.length {
            info.push_str(&length.to_string());
            if let Some(modified) = self.modified {
                let secs = modified.timestamp().max(0);
                info.push_str(&format!(" {:o}", secs));
                if let Some(mode) = self.mode {
                    info.push_str(&format!(" {:o}", mode));
                }
            }
        }

        // Room for the name and info fields plus both NUL terminators
        let limit = BlockSize::OneK.len() - 2;
        let name = truncate_to_boundary(&self.name, limit);

        let mut data = Vec::with_capacity(128);
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        // Info is dropped whole when it no longer fits after a long name
        if name.len() + info.len() <= limit {
            data.extend_from_slice(info.as_bytes());
        }
        data.push(0);

        Block::padded(0, &data, BlockSize::fitting(data.len()), 0)
    }

    /// The all-zero block that ends a YMODEM batch
    pub fn end_of_batch() -> Block {
        Block::padded(0, &[], BlockSize::Standard, 0)
    }

    /// Parse a block 0 payload.
    ///
    /// Returns `Ok(None)` for the end-of-batch marker (empty name).
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, HeaderError> {
        if payload.first().copied().unwrap_or(0) == 0 {
            return Ok(None);
        }

        let name_end = payload
            .iter()
            .position(|&b| b == 0)
            .ok_or(HeaderError::MissingTerminator)?;
        let name = std::str::from_utf8(&payload[..name_end])
            .map_err(|_| HeaderError::InvalidName)?
            .to_string();

        let rest = &payload[name_end + 1..];
        let info_end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let info = String::from_utf8_lossy(&rest[..info_end]);
        let mut fields = info.split_whitespace();

        let length = fields
            .next()
            .map(|v| {
                v.parse::<u64>().map_err(|_| HeaderError::InvalidField {
                    field: "length",
                    value: v.to_string(),
                })
            })
            .transpose()?;

        let modified = fields
            .next()
            .map(|v| parse_octal(v, "modification time"))
            .transpose()?
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
            // Zero means "unknown" on the wire
            .filter(|t| t.timestamp() != 0);

        let mode = fields
            .next()
            .map(|v| parse_octal(v, "mode"))
            .transpose()?
            .map(|m| {
                u32::try_from(m).map_err(|_| HeaderError::InvalidField {
                    field: "mode",
                    value: format!("{:o}", m),
                })
            })
            .transpose()?;

        Ok(Some(Self {
            name,
            length,
            modified,
            mode,
        }))
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character
fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn parse_octal(value: &str, field: &'static str) -> Result<u64, HeaderError> {
    u64::from_str_radix(value, 8).map_err(|_| HeaderError::InvalidField {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_header_layout() {
        let header = FileHeader::new("foo.bin").with_length(300);
        let block = header.to_block();
        assert_eq!(block.number(), 0);
        assert_eq!(block.size(), BlockSize::Standard);
        assert_eq!(&block.payload()[..12], b"foo.bin\x00300\x00");
        assert!(block.payload()[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_header_with_mtime_and_mode() {
        let modified = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let header = FileHeader::new("log.txt")
            .with_length(1024)
            .with_modified(modified)
            .with_mode(0o100644);
        let block = header.to_block();

        let parsed = FileHeader::parse(block.payload())
            .expect("Should parse")
            .expect("Should not be end of batch");
        assert_eq!(parsed, header);

        let text = String::from_utf8_lossy(block.payload());
        assert!(text.contains(&format!(" {:o} 100644", modified.timestamp())));
    }

    #[test]
    fn test_long_name_uses_one_k_block() {
        let name = "n".repeat(200);
        let block = FileHeader::new(name.clone()).with_length(1).to_block();
        assert_eq!(block.size(), BlockSize::OneK);
        let parsed = FileHeader::parse(block.payload()).unwrap().unwrap();
        assert_eq!(parsed.name, name);
    }

    #[test]
    fn test_end_of_batch() {
        let block = FileHeader::end_of_batch();
        assert_eq!(block.payload().len(), 128);
        assert_eq!(FileHeader::parse(block.payload()), Ok(None));
    }

    #[test]
    fn test_name_only() {
        let parsed = FileHeader::parse(b"a\x00\x00\x00").unwrap().unwrap();
        assert_eq!(parsed, FileHeader::new("a"));
    }

    #[test]
    fn test_missing_terminator() {
        assert_eq!(
            FileHeader::parse(b"abc"),
            Err(HeaderError::MissingTerminator)
        );
    }

    #[test]
    fn test_bad_length_field() {
        let err = FileHeader::parse(b"a\x0012x\x00").unwrap_err();
        assert!(matches!(err, HeaderError::InvalidField { field: "length", .. }));
    }

    #[test]
    fn test_zero_mtime_is_unknown() {
        let parsed = FileHeader::parse(b"a\x0010 0 644\x00").unwrap().unwrap();
        assert_eq!(parsed.length, Some(10));
        assert_eq!(parsed.modified, None);
        assert_eq!(parsed.mode, Some(0o644));
    }

    #[test]
    fn test_oversized_name_cut_on_char_boundary() {
        // 'é' is two bytes, so 1022 bytes would end inside a character
        let name = format!("a{}", "é".repeat(600));
        let block = FileHeader::new(name.clone()).with_length(42).to_block();
        assert_eq!(block.size(), BlockSize::OneK);

        let parsed = FileHeader::parse(block.payload()).unwrap().unwrap();
        assert_eq!(parsed.name.len(), 1021);
        assert!(name.starts_with(&parsed.name));
        assert_eq!(parsed.length, None);
    }

    #[test]
    fn test_info_dropped_when_name_fills_block() {
        let name = "n".repeat(1020);
        let block = FileHeader::new(name.clone()).with_length(12345).to_block();
        let parsed = FileHeader::parse(block.payload()).unwrap().unwrap();
        assert_eq!(parsed.name, name);
        assert_eq!(parsed.length, None);
    }

    #[test]
    fn test_oversized_mode_is_rejected() {
        let err = FileHeader::parse(b"a\x0010 0 77777777777\x00").unwrap_err();
        assert!(matches!(err, HeaderError::InvalidField { field: "mode", .. }));
    }
}
