//! Error types for store operations.

use std::io;
use synckv_codec::{CodecError, ValueType};
use synckv_storage::StorageError;
use thiserror::Error;

/// Result type for store operations.
pub type KvResult<T> = Result<T, KvError>;

/// Boundary code for argument-validation failures.
pub const CODE_INVALID_ARGUMENT: u32 = 401;
/// Boundary code for exceeding the data-change subscription bound.
pub const CODE_TOO_MANY_SUBSCRIPTIONS: u32 = 15_100_001;
/// Boundary code for corrupted store data.
pub const CODE_CORRUPTED: u32 = 15_100_003;
/// Boundary code for a read miss.
pub const CODE_NOT_FOUND: u32 = 15_100_004;
/// Boundary code for operations on a closed store or result set.
pub const CODE_STORE_CLOSED: u32 = 15_100_005;
/// Boundary code for failures without a dedicated code.
pub const CODE_INTERNAL: u32 = 15_100_000;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An argument has the wrong shape, type, or value.
    ///
    /// Raised before any I/O is attempted; no partial side effects.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The key is empty or exceeds the key length limit.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },

    /// No value is stored under the key.
    #[error("key not found: {key}")]
    NotFound {
        /// The key that was looked up.
        key: String,
    },

    /// The stored value has a different type than requested.
    #[error("type mismatch: expected {expected}, stored value is {actual}")]
    TypeMismatch {
        /// The type the caller expected.
        expected: ValueType,
        /// The type actually stored.
        actual: ValueType,
    },

    /// The store (or result set) has been closed.
    #[error("store is closed")]
    StoreClosed,

    /// Another process holds the store's directory lock.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The data-change subscription bound was reached.
    #[error("too many subscriptions: at most {limit} data-change subscriptions per store")]
    TooManySubscriptions {
        /// The per-store bound.
        limit: usize,
    },

    /// The operation is not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Stored data cannot be interpreted.
    #[error("corrupted store data: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The named device cannot be reached.
    #[error("device unreachable: {device}")]
    DeviceUnreachable {
        /// The device that could not be reached.
        device: String,
    },

    /// Purging a device's replica failed.
    #[error("failed to remove data for device {device}: {message}")]
    RemoveDeviceDataFailed {
        /// The device whose data was to be removed.
        device: String,
        /// Description of the failure.
        message: String,
    },
}

impl KvError {
    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid-operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a corrupted-data error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Returns the numeric boundary code for this error.
    ///
    /// Argument-validation failures map to 401; store-level failures map
    /// to the `151000xx` range. Failures without a documented boundary
    /// code report [`CODE_INTERNAL`].
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidArgument { .. } | Self::InvalidKey { .. } => CODE_INVALID_ARGUMENT,
            Self::TooManySubscriptions { .. } => CODE_TOO_MANY_SUBSCRIPTIONS,
            Self::Corrupted { .. } => CODE_CORRUPTED,
            Self::NotFound { .. } | Self::TypeMismatch { .. } => CODE_NOT_FOUND,
            Self::StoreClosed => CODE_STORE_CLOSED,
            _ => CODE_INTERNAL,
        }
    }
}

impl From<CodecError> for KvError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::TypeMismatch { expected, actual } => {
                Self::TypeMismatch { expected, actual }
            }
            CodecError::Corrupted { message } => Self::Corrupted { message },
            CodecError::InvalidKey { message } => Self::InvalidKey { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_codes() {
        assert_eq!(KvError::invalid_argument("x").code(), 401);
        assert_eq!(
            KvError::InvalidKey {
                message: "empty".into()
            }
            .code(),
            401
        );
        assert_eq!(KvError::TooManySubscriptions { limit: 8 }.code(), 15_100_001);
        assert_eq!(KvError::corrupted("bad crc").code(), 15_100_003);
        assert_eq!(KvError::not_found("k").code(), 15_100_004);
        assert_eq!(KvError::StoreClosed.code(), 15_100_005);
    }

    #[test]
    fn codec_errors_convert() {
        let err: KvError = CodecError::TypeMismatch {
            expected: ValueType::String,
            actual: ValueType::Integer,
        }
        .into();
        assert!(matches!(err, KvError::TypeMismatch { .. }));
        assert_eq!(err.code(), CODE_NOT_FOUND);

        let err: KvError = CodecError::invalid_key("empty").into();
        assert_eq!(err.code(), CODE_INVALID_ARGUMENT);
    }
}
