//! Error types for sync operations.

use synckv_core::KvError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing.
///
/// Per-device reconciliation failures are not errors: they surface as
/// [`synckv_core::SyncOutcome`] statuses, because a multi-device pass
/// can partially succeed by design. These variants cover failures of
/// the call itself.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The store rejected an operation (closed, bad argument, ...).
    #[error("store error: {0}")]
    Store(#[from] KvError),

    /// The peer did not answer.
    #[error("device unreachable: {device}")]
    Unreachable {
        /// The device that could not be reached.
        device: String,
    },

    /// The transport failed to move data.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The peer did not answer within the allowed delay.
    #[error("sync with {device} timed out")]
    Timeout {
        /// The device that timed out.
        device: String,
    },
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
