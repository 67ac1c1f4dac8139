//! Transaction buffering and state.

use crate::engine::Mutation;
use crate::error::{KvError, KvResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use synckv_codec::Key;

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction is active; mutations apply immediately.
    Idle,
    /// A transaction is buffering mutations.
    Active,
    /// The last transaction committed.
    Committed,
    /// The last transaction rolled back.
    Aborted,
}

/// Buffers the mutations of the store's single active transaction.
///
/// At most one transaction is active per store; while it is, mutations
/// are staged here (last write per key wins) and are invisible to other
/// readers until commit. Commit drains the buffer into one atomic batch;
/// rollback discards it.
#[derive(Debug)]
pub(crate) struct TransactionManager {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: TransactionState,
    // key -> Some(encoded value) for put, None for delete
    writes: BTreeMap<Key, Option<Vec<u8>>>,
}

impl TransactionManager {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: TransactionState::Idle,
                writes: BTreeMap::new(),
            }),
        }
    }

    /// Starts a transaction; fails if one is already active.
    pub(crate) fn begin(&self) -> KvResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == TransactionState::Active {
            return Err(KvError::invalid_operation(
                "a transaction is already active on this store",
            ));
        }
        inner.state = TransactionState::Active;
        inner.writes.clear();
        Ok(())
    }

    /// Whether a transaction is currently buffering.
    pub(crate) fn is_active(&self) -> bool {
        self.inner.lock().state == TransactionState::Active
    }

    /// Current transaction state.
    pub(crate) fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    /// Stages mutations if a transaction is active.
    ///
    /// Returns `false` when idle, in which case the caller applies the
    /// mutations directly.
    pub(crate) fn stage(&self, mutations: &[Mutation]) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != TransactionState::Active {
            return false;
        }
        for mutation in mutations {
            match mutation {
                Mutation::Put { key, value } => {
                    inner.writes.insert(key.clone(), Some(value.clone()));
                }
                Mutation::Delete { key } => {
                    inner.writes.insert(key.clone(), None);
                }
            }
        }
        true
    }

    /// Reads through the buffer: `Some(Some(bytes))` for a staged put,
    /// `Some(None)` for a staged delete, `None` if the key is unstaged.
    pub(crate) fn read_through(&self, key: &Key) -> Option<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        if inner.state != TransactionState::Active {
            return None;
        }
        inner.writes.get(key).cloned()
    }

    /// Drains the buffer for commit; fails if no transaction is active.
    pub(crate) fn take_for_commit(&self) -> KvResult<Vec<Mutation>> {
        let mut inner = self.inner.lock();
        if inner.state != TransactionState::Active {
            return Err(KvError::invalid_operation("no active transaction to commit"));
        }
        let writes = std::mem::take(&mut inner.writes);
        inner.state = TransactionState::Committed;
        Ok(writes
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => Mutation::Put { key, value },
                None => Mutation::Delete { key },
            })
            .collect())
    }

    /// Discards the buffer; fails if no transaction is active.
    pub(crate) fn rollback(&self) -> KvResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != TransactionState::Active {
            return Err(KvError::invalid_operation(
                "no active transaction to roll back",
            ));
        }
        inner.writes.clear();
        inner.state = TransactionState::Aborted;
        Ok(())
    }

    /// Drops any active transaction without error (store close path).
    pub(crate) fn discard(&self) {
        let mut inner = self.inner.lock();
        inner.writes.clear();
        if inner.state == TransactionState::Active {
            inner.state = TransactionState::Aborted;
        }
    }
}
