//! Error types for fragforge-media.

use std::io;
use thiserror::Error;

/// Result type for fragforge-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for fragforge-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed input bytes. `offset` is the absolute file offset of the
    /// box (or field) that failed.
    #[error("Failed to deserialize {atom} at offset {offset}: {message}")]
    Deserialize {
        atom: String,
        offset: u64,
        message: String,
    },

    /// A requested mutation was rejected before any state changed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A box wrote a different number of bytes than it declared.
    #[error("{atom} wrote {actual} bytes but declared {declared}")]
    SizeMismatch {
        atom: String,
        declared: u64,
        actual: u64,
    },

    /// `trun.data_offset` kept moving after the retry bound was exhausted.
    #[error("Data offset did not converge after {attempts} attempts")]
    OffsetConvergence { attempts: usize },
}

impl Error {
    /// Create a deserialize error.
    pub fn deserialize(atom: impl Into<String>, offset: u64, message: impl Into<String>) -> Self {
        Self::Deserialize {
            atom: atom.into(),
            offset,
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error signals a broken internal invariant rather than
    /// bad input or a rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SizeMismatch { .. } | Self::OffsetConvergence { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::deserialize("trun", 1234, "unexpected end of data");
        assert_eq!(
            err.to_string(),
            "Failed to deserialize trun at offset 1234: unexpected end of data"
        );

        let err = Error::validation("flags do not fit in 24 bits");
        assert_eq!(err.to_string(), "Validation failed: flags do not fit in 24 bits");

        let err = Error::OffsetConvergence { attempts: 5 };
        assert_eq!(err.to_string(), "Data offset did not converge after 5 attempts");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::OffsetConvergence { attempts: 5 }.is_fatal());
        assert!(Error::SizeMismatch {
            atom: "moof".into(),
            declared: 16,
            actual: 12
        }
        .is_fatal());
        assert!(!Error::validation("nope").is_fatal());
        assert!(!Error::deserialize("mdat", 0, "truncated").is_fatal());
    }
}
