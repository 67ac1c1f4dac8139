//! Storage backend trait.

use crate::error::StorageResult;

/// A low-level append-only byte store.
///
/// Backends are opaque: the store log owns all record framing and
/// interpretation, a backend only moves bytes. Implementations must be
/// `Send + Sync`; the engine serializes access around them.
///
/// # Invariants
///
/// - `append` returns the offset the data was written at
/// - `read_at` returns exactly the bytes previously appended there
/// - after `flush`, appended data survives process termination
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the read starts or ends beyond the current size, or on
    /// an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data, returning the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes pending writes to durable storage.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes (the next append offset).
    fn size(&self) -> StorageResult<u64>;

    /// Syncs data and metadata to durable storage.
    ///
    /// Stronger than `flush`: file metadata is durable too.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates to `new_size`, discarding everything after it.
    ///
    /// Used to drop a torn tail after crash recovery and to clear the
    /// log after a snapshot.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` exceeds the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
