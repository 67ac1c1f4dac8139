//! Error types for codec operations.

use crate::value::ValueType;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The stored value has a different type than the caller asked for.
    #[error("type mismatch: expected {expected}, stored value is {actual}")]
    TypeMismatch {
        /// The type the caller expected.
        expected: ValueType,
        /// The type actually stored.
        actual: ValueType,
    },

    /// The stored bytes cannot be decoded as any value.
    ///
    /// Fatal for the entry, not for the store.
    #[error("corrupted entry: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The key is empty, too long, or otherwise unusable.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Creates a corrupted-entry error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid-key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}
