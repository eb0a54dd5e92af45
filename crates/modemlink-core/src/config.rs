//! Transfer configuration
//!
//! Timeouts and retry limits, loadable from JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS};

/// Errors loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Timing and retry settings for a transfer session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Per-attempt wait for the peer's handshake byte or first block
    pub handshake_timeout_ms: u64,
    /// Per-attempt wait for ACK/NAK or for the next block
    pub response_timeout_ms: u64,
    /// Inter-character timeout while collecting the rest of a block
    pub char_timeout_ms: u64,
    /// Line silence required before a NAK is sent after a bad block
    pub purge_timeout_ms: u64,
    /// Consecutive failures tolerated before the transfer fails
    pub max_retries: u32,
    /// Unanswered 'C' handshakes before an XMODEM receiver falls back to checksum mode
    pub crc_handshake_attempts: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: DEFAULT_TIMEOUT_MS,
            response_timeout_ms: DEFAULT_TIMEOUT_MS,
            char_timeout_ms: 1000,
            purge_timeout_ms: 100,
            max_retries: DEFAULT_MAX_RETRIES,
            crc_handshake_attempts: 3,
        }
    }
}

impl TransferConfig {
    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check that every limit allows a transfer to make progress
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("response_timeout_ms", self.response_timeout_ms),
            ("char_timeout_ms", self.char_timeout_ms),
            ("max_retries", self.max_retries as u64),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub(crate) fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub(crate) fn char_timeout(&self) -> Duration {
        Duration::from_millis(self.char_timeout_ms)
    }

    pub(crate) fn purge_timeout(&self) -> Duration {
        Duration::from_millis(self.purge_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_transfer_config_default() {
        let config = TransferConfig::default();
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.response_timeout_ms, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = TransferConfig::from_json_str(r#"{ "max_retries": 4 }"#).unwrap();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.handshake_timeout_ms, 3000);
    }

    #[test]
    fn test_zero_retries_rejected() {
        let err = TransferConfig::from_json_str(r#"{ "max_retries": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "max_retries",
                ..
            }
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "response_timeout_ms": 250 }}"#).unwrap();
        let config = TransferConfig::from_file(file.path()).unwrap();
        assert_eq!(config.response_timeout_ms, 250);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            TransferConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
