//! Error types for storage backends.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read extended beyond the end of the backing store.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested read offset.
        offset: u64,
        /// Requested read length.
        len: usize,
        /// Current backing-store size.
        size: u64,
    },

    /// The backing store contains data that cannot be interpreted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}
