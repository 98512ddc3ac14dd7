//! Error types for core types.

use thiserror::Error;

/// Errors raised when constructing core values from untrusted input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Fingerprint text is not a 64-character lowercase hex digest.
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Range bounds are inverted.
    #[error("Invalid offset range: [{lo}, {hi}]")]
    InvalidRange { lo: u64, hi: u64 },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
