//! Error types for MistDB

use thiserror::Error;

/// Result type alias for MistDB operations
pub type Result<T> = std::result::Result<T, MistError>;

/// MistDB error types
#[derive(Error, Debug)]
pub enum MistError {
    /// IO operation failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Builder received series out of fingerprint order
    #[error("out of order series: fingerprint {got:#x} after {last:#x}")]
    OutOfOrder { last: u64, got: u64 },

    /// Caller handed the core something it cannot build from
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Checksum mismatch on a page
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Schema version not understood by this reader
    #[error("unknown schema version: {0}")]
    UnknownVersion(u8),

    /// Compression codec id not in the enumeration
    #[error("unknown codec id: {0}")]
    UnknownCodec(u8),

    /// Structural corruption: truncated page, bad magic, inconsistent index
    #[error("corrupt block: {0}")]
    Corrupt(String),

    /// Page payload failed to decompress
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Merge-builder populate callback returned an error
    #[error("populate failed: {0}")]
    PopulateFailed(String),
}

impl MistError {
    /// Check if error indicates block corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            MistError::ChecksumMismatch { .. }
                | MistError::UnknownVersion(_)
                | MistError::UnknownCodec(_)
                | MistError::Corrupt(_)
                | MistError::Decompress(_)
        )
    }

    /// Check if error indicates bad caller input
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            MistError::OutOfOrder { .. } | MistError::InvalidInput(_)
        )
    }
}
