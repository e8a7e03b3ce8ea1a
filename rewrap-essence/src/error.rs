//! Error types for essence parsing.

use std::io;
use thiserror::Error;

/// Result type for essence operations.
pub type Result<T> = std::result::Result<T, EssenceError>;

/// Errors that can occur while reading or indexing raw essence.
#[derive(Debug, Error)]
pub enum EssenceError {
    /// IO error on the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A buffer size was requested beyond its allocation.
    #[error("Buffer size {requested} exceeds allocated {allocated}")]
    BufferOverflow {
        /// Requested size in bytes.
        requested: usize,
        /// Allocated capacity in bytes.
        allocated: usize,
    },

    /// A frame offset was appended out of order.
    #[error("Non-monotonic frame offset {offset} after {last}")]
    NonMonotonicOffset {
        /// The rejected offset.
        offset: i64,
        /// The last offset in the index.
        last: i64,
    },

    /// A frame position is not covered by the index.
    #[error("Frame position {position} not indexed (have {available})")]
    PositionOutOfRange {
        /// Requested position.
        position: i64,
        /// Number of indexed offsets.
        available: usize,
    },

    /// The essence container label is not supported.
    #[error("Unsupported essence type: {message}")]
    UnsupportedEssence {
        /// Description of the unsupported essence.
        message: String,
    },

    /// The essence bytes do not match the expected structure.
    #[error("Invalid essence data at offset {offset}: {message}")]
    InvalidEssence {
        /// Description of the problem.
        message: String,
        /// Stream offset where the problem was detected.
        offset: i64,
    },

    /// A track id was added twice to a content package.
    #[error("Duplicate track id {0} in content package")]
    DuplicateTrack(u32),
}

impl EssenceError {
    /// Create an unsupported essence error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedEssence {
            message: message.into(),
        }
    }

    /// Create an invalid essence error.
    pub fn invalid(message: impl Into<String>, offset: i64) -> Self {
        Self::InvalidEssence {
            message: message.into(),
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EssenceError::NonMonotonicOffset { offset: 10, last: 20 };
        assert_eq!(err.to_string(), "Non-monotonic frame offset 10 after 20");

        let err = EssenceError::invalid("expecting 0xff", 4096);
        assert!(err.to_string().contains("4096"));

        let err = EssenceError::unsupported("label 06.0e.2b.34");
        assert!(err.to_string().starts_with("Unsupported essence type"));
    }
}
