//! Sync operation log and per-device cursors.
//!
//! Every locally committed mutation is recorded here so a sync driver
//! can push it to peers; per-device cursors remember how far each peer
//! has acknowledged pushes and how far pulls have progressed.

use std::collections::HashMap;

use crate::types::DeviceId;
use synckv_codec::Key;

/// A replicable operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    /// Insert or update of a key.
    Put {
        /// Key written.
        key: Key,
        /// Encoded value bytes.
        value: Vec<u8>,
    },
    /// Removal of a key.
    Delete {
        /// Key removed.
        key: Key,
    },
}

impl SyncOp {
    /// The key this operation affects.
    #[must_use]
    pub fn key(&self) -> &Key {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// One committed local operation, ordered by sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    /// Commit sequence on the originating store; strictly increasing.
    pub sequence: u64,
    /// The operation.
    pub op: SyncOp,
}

/// Tracks replicable local operations and per-device progress.
#[derive(Debug, Default)]
pub(crate) struct SyncOplog {
    records: Vec<SyncRecord>,
    next_sequence: u64,
    // highest sequence each device has acknowledged receiving
    push_acked: HashMap<DeviceId, u64>,
    // highest remote sequence pulled from each device
    pull_cursor: HashMap<DeviceId, u64>,
}

impl SyncOplog {
    pub(crate) fn new() -> Self {
        Self {
            records: Vec::new(),
            next_sequence: 1,
            push_acked: HashMap::new(),
            pull_cursor: HashMap::new(),
        }
    }

    /// Records one local operation and returns its sequence.
    pub(crate) fn record(&mut self, op: SyncOp) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.records.push(SyncRecord { sequence, op });
        sequence
    }

    /// Operations with a sequence greater than `sequence`, in order.
    pub(crate) fn since(&self, sequence: u64) -> Vec<SyncRecord> {
        self.records
            .iter()
            .filter(|record| record.sequence > sequence)
            .cloned()
            .collect()
    }

    /// Operations not yet acknowledged by `device`.
    pub(crate) fn pending_for(&self, device: &DeviceId) -> Vec<SyncRecord> {
        let acked = self.push_acked.get(device).copied().unwrap_or(0);
        self.records
            .iter()
            .filter(|record| record.sequence > acked)
            .cloned()
            .collect()
    }

    /// Marks everything up to `sequence` as received by `device`.
    pub(crate) fn acknowledge(&mut self, device: &DeviceId, sequence: u64) {
        let entry = self.push_acked.entry(device.clone()).or_insert(0);
        *entry = (*entry).max(sequence);
    }

    /// Highest remote sequence pulled from `device` so far.
    pub(crate) fn pull_cursor(&self, device: &DeviceId) -> u64 {
        self.pull_cursor.get(device).copied().unwrap_or(0)
    }

    /// Advances the pull cursor for `device`.
    pub(crate) fn set_pull_cursor(&mut self, device: &DeviceId, sequence: u64) {
        let entry = self.pull_cursor.entry(device.clone()).or_insert(0);
        *entry = (*entry).max(sequence);
    }

    /// Forgets all progress for `device` (its replica was purged).
    pub(crate) fn forget_device(&mut self, device: &DeviceId) {
        self.push_acked.remove(device);
        self.pull_cursor.remove(device);
    }

    /// Drops records every known device has acknowledged.
    pub(crate) fn compact(&mut self) {
        let Some(min_acked) = self.push_acked.values().copied().min() else {
            return;
        };
        self.records.retain(|record| record.sequence > min_acked);
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
