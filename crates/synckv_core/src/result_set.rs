//! Bidirectional cursor over a query snapshot.

use crate::error::{KvError, KvResult};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use synckv_codec::Entry;

/// A stateful cursor over the entries a query matched at creation time.
///
/// The snapshot is fixed: concurrent mutations do not change the count
/// or contents. Position ranges over `[-1, count]`, where `-1` is
/// before-first and `count` is after-last; a fresh cursor sits at `-1`.
/// Navigation returns `true` only when it lands on a valid entry and
/// clamps to the nearest boundary otherwise.
///
/// Cursors belong to the store that produced them: closing the store, or
/// closing the cursor through
/// [`close_result_set`](crate::KvStore::close_result_set), makes every
/// further operation fail.
pub struct KvStoreResultSet {
    entries: Vec<Entry>,
    position: AtomicI64,
    closed: AtomicBool,
    store_open: Arc<AtomicBool>,
}

impl KvStoreResultSet {
    pub(crate) fn new(entries: Vec<Entry>, store_open: Arc<AtomicBool>) -> Self {
        Self {
            entries,
            position: AtomicI64::new(-1),
            closed: AtomicBool::new(false),
            store_open,
        }
    }

    fn ensure_usable(&self) -> KvResult<()> {
        if !self.store_open.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(KvError::StoreClosed);
        }
        Ok(())
    }

    fn count_i64(&self) -> i64 {
        self.entries.len() as i64
    }

    /// Moves to `target` if it is a valid entry position, clamping to the
    /// nearest boundary otherwise. Returns whether the move landed.
    fn seek(&self, target: i64) -> bool {
        let count = self.count_i64();
        if target >= 0 && target < count {
            self.position.store(target, Ordering::SeqCst);
            true
        } else {
            self.position
                .store(if target < 0 { -1 } else { count }, Ordering::SeqCst);
            false
        }
    }

    /// Total number of entries in the snapshot.
    pub fn get_count(&self) -> KvResult<usize> {
        self.ensure_usable()?;
        Ok(self.entries.len())
    }

    /// Current position, `-1` before the first entry.
    pub fn get_position(&self) -> KvResult<i64> {
        self.ensure_usable()?;
        Ok(self.position.load(Ordering::SeqCst))
    }

    /// Moves to the first entry.
    pub fn move_to_first(&self) -> KvResult<bool> {
        self.ensure_usable()?;
        Ok(self.seek(0))
    }

    /// Moves to the last entry.
    pub fn move_to_last(&self) -> KvResult<bool> {
        self.ensure_usable()?;
        Ok(self.seek(self.count_i64() - 1))
    }

    /// Moves forward one entry.
    pub fn move_to_next(&self) -> KvResult<bool> {
        self.ensure_usable()?;
        let current = self.position.load(Ordering::SeqCst);
        Ok(self.seek(current + 1))
    }

    /// Moves backward one entry.
    pub fn move_to_previous(&self) -> KvResult<bool> {
        self.ensure_usable()?;
        let current = self.position.load(Ordering::SeqCst);
        Ok(self.seek(current - 1))
    }

    /// Moves by a relative offset.
    pub fn move_by(&self, offset: i64) -> KvResult<bool> {
        self.ensure_usable()?;
        let current = self.position.load(Ordering::SeqCst);
        Ok(self.seek(current.saturating_add(offset)))
    }

    /// Moves to an absolute position.
    pub fn move_to_position(&self, position: i64) -> KvResult<bool> {
        self.ensure_usable()?;
        Ok(self.seek(position))
    }

    /// Whether the cursor is on the first entry.
    pub fn is_first(&self) -> KvResult<bool> {
        self.ensure_usable()?;
        Ok(!self.entries.is_empty() && self.position.load(Ordering::SeqCst) == 0)
    }

    /// Whether the cursor is on the last entry.
    pub fn is_last(&self) -> KvResult<bool> {
        self.ensure_usable()?;
        let count = self.count_i64();
        Ok(count > 0 && self.position.load(Ordering::SeqCst) == count - 1)
    }

    /// Whether the cursor is before the first entry.
    pub fn is_before_first(&self) -> KvResult<bool> {
        self.ensure_usable()?;
        Ok(self.position.load(Ordering::SeqCst) < 0)
    }

    /// Whether the cursor is after the last entry.
    pub fn is_after_last(&self) -> KvResult<bool> {
        self.ensure_usable()?;
        Ok(self.position.load(Ordering::SeqCst) >= self.count_i64())
    }

    /// Returns the entry at the current position.
    ///
    /// Calling with the position at a boundary (`-1` or `count`) is a
    /// fatal misuse of the cursor contract.
    pub fn get_entry(&self) -> KvResult<Entry> {
        self.ensure_usable()?;
        let position = self.position.load(Ordering::SeqCst);
        if position < 0 || position >= self.count_i64() {
            return Err(KvError::invalid_operation(format!(
                "result set position {position} is not on an entry"
            )));
        }
        Ok(self.entries[position as usize].clone())
    }

    /// Whether this cursor has been closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the cursor closed; returns `false` if it already was.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for KvStoreResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStoreResultSet")
            .field("count", &self.entries.len())
            .field("position", &self.position.load(Ordering::SeqCst))
            .field("closed", &self.is_closed())
            .finish()
    }
}
