//! Error types for MXF writing

use rewrap_essence::EssenceError;
use std::io;
use thiserror::Error;

/// Result type for MXF operations
pub type Result<T> = std::result::Result<T, MxfError>;

/// Errors that can occur while building or writing an MXF file
#[derive(Debug, Error)]
pub enum MxfError {
    /// IO error during read/write
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from the essence layer
    #[error(transparent)]
    Essence(#[from] EssenceError),

    /// Invalid writer configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        message: String,
    },

    /// An operation was called in a state that does not allow it
    #[error("Precondition failed: {message}")]
    Precondition {
        /// The violated precondition.
        message: String,
    },

    /// Invalid KLV structure
    #[error("Invalid KLV at offset {offset}: {message}")]
    InvalidKlv {
        /// Description of the problem.
        message: String,
        /// Byte offset of the KLV.
        offset: u64,
    },

    /// Invalid partition pack
    #[error("Invalid partition: {message}")]
    InvalidPartition {
        /// Description of the problem.
        message: String,
    },

    /// Invalid index table segment
    #[error("Invalid index table segment: {message}")]
    InvalidIndex {
        /// Description of the problem.
        message: String,
    },

    /// Insufficient data for operation
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// BER length encoding error
    #[error("BER encoding error: {message}")]
    Ber {
        /// Description of the problem.
        message: String,
    },

    /// A local set property value does not fit a 16-bit length
    #[error("Property 0x{tag:04x} value of {size} bytes exceeds the local set limit")]
    PropertyTooLarge {
        /// Local tag of the property.
        tag: u16,
        /// Value size in bytes.
        size: usize,
    },

    /// A local tag has no registered property label
    #[error("No property label registered for local tag 0x{0:04x}")]
    UnknownTag(u16),

    /// Requested fill would move backwards or is too small for a fill KLV
    #[error("Cannot fill from {position} to {target}")]
    InvalidFill {
        /// Current file position.
        position: u64,
        /// Requested end position.
        target: u64,
    },

    /// Rewritten header metadata no longer fits the space reserved for it
    #[error("Header metadata grew from {reserved} to {required} bytes")]
    MetadataSizeChanged {
        /// Bytes reserved when the header was first written.
        reserved: u64,
        /// Bytes needed by the rewritten metadata.
        required: u64,
    },

    /// Invalid timecode string
    #[error("Invalid timecode: {message}")]
    InvalidTimecode {
        /// Description of the problem.
        message: String,
    },
}

impl MxfError {
    /// Create an invalid configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a precondition error
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Create a BER error
    pub fn ber(message: impl Into<String>) -> Self {
        Self::Ber {
            message: message.into(),
        }
    }
}
