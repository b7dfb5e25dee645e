//! Error types for lobkit core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in large object operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Overflow file error.
    #[error("storage error: {0}")]
    Storage(#[from] lobkit_storage::StorageError),

    /// I/O error from a source or store stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Position is out of range for the operation.
    #[error("invalid position {position}: {message}")]
    InvalidPosition {
        /// The offending position.
        position: u64,
        /// Why the position was rejected.
        message: String,
    },

    /// Buffer offset/length arguments are out of bounds.
    #[error("invalid offset {offset} or length {length} for buffer of {buffer_len}")]
    InvalidOffsetOrLength {
        /// The requested offset.
        offset: usize,
        /// The requested length.
        length: usize,
        /// The size of the supplied buffer.
        buffer_len: usize,
    },

    /// Byte sequence is not valid modified UTF-8.
    #[error("malformed encoding at byte {offset}: {message}")]
    MalformedEncoding {
        /// Byte offset of the offending sequence.
        offset: u64,
        /// Description of the problem.
        message: String,
    },

    /// Source ended before a declared length was satisfied.
    #[error("premature end of data: expected {expected}, got {actual}")]
    PrematureEndOfData {
        /// Expected amount (bytes or characters).
        expected: u64,
        /// Amount actually available.
        actual: u64,
    },

    /// Mutating operation invoked on read-only content.
    #[error("operation {operation} is not supported on read-only content")]
    UnsupportedOnReadOnly {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// The content handle or byte store has been released.
    #[error("large object has been released")]
    Released,

    /// The stream has been closed.
    #[error("stream is closed")]
    StreamClosed,

    /// The owning session has been closed.
    #[error("session is closed")]
    SessionClosed,
}

impl CoreError {
    /// Creates an invalid position error.
    pub fn invalid_position(position: u64, message: impl Into<String>) -> Self {
        Self::InvalidPosition {
            position,
            message: message.into(),
        }
    }

    /// Creates a malformed encoding error.
    pub fn malformed(offset: u64, message: impl Into<String>) -> Self {
        Self::MalformedEncoding {
            offset,
            message: message.into(),
        }
    }

    /// Creates a premature end of data error.
    pub fn premature_end(expected: u64, actual: u64) -> Self {
        Self::PrematureEndOfData { expected, actual }
    }

    /// Creates an unsupported operation error.
    pub fn read_only(operation: &'static str) -> Self {
        Self::UnsupportedOnReadOnly { operation }
    }

    /// Returns true if the error signals a bug rather than a data problem.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_fatal(),
            Self::UnsupportedOnReadOnly { .. } => true,
            _ => false,
        }
    }
}

impl From<CoreError> for io::Error {
    fn from(err: CoreError) -> Self {
        let kind = match &err {
            CoreError::Io(e) => e.kind(),
            CoreError::PrematureEndOfData { .. } => io::ErrorKind::UnexpectedEof,
            CoreError::MalformedEncoding { .. } => io::ErrorKind::InvalidData,
            CoreError::InvalidPosition { .. } | CoreError::InvalidOffsetOrLength { .. } => {
                io::ErrorKind::InvalidInput
            }
            _ => io::ErrorKind::Other,
        };
        match err {
            CoreError::Io(e) => e,
            other => io::Error::new(kind, other),
        }
    }
}

/// Checks `offset`/`length` against a buffer of `buffer_len` elements.
pub(crate) fn check_bounds(offset: usize, length: usize, buffer_len: usize) -> CoreResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= buffer_len => Ok(()),
        _ => Err(CoreError::InvalidOffsetOrLength {
            offset,
            length,
            buffer_len,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_checks() {
        assert!(check_bounds(0, 10, 10).is_ok());
        assert!(check_bounds(10, 0, 10).is_ok());
        assert!(matches!(
            check_bounds(5, 6, 10),
            Err(CoreError::InvalidOffsetOrLength { .. })
        ));
        assert!(check_bounds(usize::MAX, 1, 10).is_err());
    }

    #[test]
    fn fatal_classification() {
        let invariant: CoreError = lobkit_storage::StorageError::invariant("bad tail").into();
        assert!(invariant.is_fatal());
        assert!(CoreError::read_only("truncate").is_fatal());
        assert!(!CoreError::premature_end(10, 7).is_fatal());
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let err: io::Error = CoreError::premature_end(3, 1).into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        let err: io::Error = CoreError::malformed(0, "bad").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let err: io::Error = CoreError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "x")).into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn messages() {
        let err = CoreError::invalid_position(12, "position too large");
        assert_eq!(err.to_string(), "invalid position 12: position too large");
    }
}
