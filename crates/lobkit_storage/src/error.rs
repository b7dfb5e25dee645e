//! Error types for overflow file operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while working with overflow files.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A position beyond the logical end of the file was requested.
    #[error("position {pos} is beyond the end of the file (length {len})")]
    PositionPastEnd {
        /// The requested position.
        pos: u64,
        /// The current logical length.
        len: u64,
    },

    /// An internal bookkeeping invariant no longer holds.
    ///
    /// Correct callers never trigger this; it is not recoverable.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// The file has been closed.
    #[error("file is closed")]
    Closed,

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),
}

impl StorageError {
    /// Creates an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Creates an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption(message.into())
    }

    /// Returns true if the error signals a bug rather than a runtime condition.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}
