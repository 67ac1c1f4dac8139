//! Sync coordinator: drives per-device reconciliation for one store.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use std::sync::Arc;
use synckv_core::{DeviceId, KvError, KvStore, SyncOutcome, SyncStatus};

/// Default upper bound on waiting for a peer, in milliseconds.
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 10_000;

/// Direction of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Only fetch the peers' changes.
    PullOnly,
    /// Only deliver local changes.
    PushOnly,
    /// Pull first, then push.
    PushPull,
}

impl SyncMode {
    fn pulls(self) -> bool {
        matches!(self, Self::PullOnly | Self::PushPull)
    }

    fn pushes(self) -> bool {
        matches!(self, Self::PushOnly | Self::PushPull)
    }
}

/// Drives device-to-device reconciliation for one open store.
///
/// A pass never fails because one peer does: each device produces a
/// [`SyncOutcome`], and the whole set is delivered as one sync-complete
/// event through the store's notification hub. Applied batches are not
/// rolled back when a later device fails or the pass times out.
pub struct SyncCoordinator<T: SyncTransport> {
    store: Arc<KvStore>,
    transport: Arc<T>,
}

impl<T: SyncTransport> SyncCoordinator<T> {
    /// Creates a coordinator for `store` over `transport`.
    pub fn new(store: Arc<KvStore>, transport: T) -> Self {
        Self {
            store,
            transport: Arc::new(transport),
        }
    }

    /// The store this coordinator drives.
    #[must_use]
    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }

    /// Runs one reconciliation pass against the named devices.
    ///
    /// Argument validation happens first and fails the call; everything
    /// after degrades to per-device outcomes. `timeout_ms` bounds how
    /// long each peer may take; it never undoes batches already applied.
    pub fn sync(
        &self,
        devices: &[DeviceId],
        mode: SyncMode,
        timeout_ms: Option<u64>,
    ) -> SyncResult<Vec<SyncOutcome>> {
        if devices.is_empty() {
            return Err(KvError::invalid_argument("no devices to sync with").into());
        }
        if devices.iter().any(DeviceId::is_local) {
            return Err(
                KvError::invalid_argument("cannot sync with the local device").into(),
            );
        }
        if timeout_ms == Some(0) {
            return Err(KvError::invalid_argument("sync timeout must be positive").into());
        }
        if !self.store.is_open() {
            return Err(KvError::StoreClosed.into());
        }

        let settings = self.store.sync_settings();
        let timeout = timeout_ms.unwrap_or_else(|| {
            DEFAULT_SYNC_TIMEOUT_MS.max(settings.allowed_delay_ms)
        });
        let eligible = settings.peers_eligible();

        let outcomes: Vec<SyncOutcome> = devices
            .iter()
            .map(|device| {
                let status = if eligible {
                    self.sync_device(device, mode, timeout)
                } else {
                    SyncStatus::NotEligible
                };
                tracing::debug!(device = %device, ?status, "sync pass finished");
                SyncOutcome::new(device.clone(), status)
            })
            .collect();

        self.store.emit_sync_complete(&outcomes);
        Ok(outcomes)
    }

    /// Runs a pass only when the store has ambient sync enabled.
    ///
    /// Returns `None` when sync is disabled. Used after commits by
    /// embedders that want `auto_sync` stores to reconcile eagerly;
    /// explicit [`sync`](Self::sync) calls ignore the flag.
    pub fn auto_sync(&self, devices: &[DeviceId]) -> SyncResult<Option<Vec<SyncOutcome>>> {
        if !self.store.sync_settings().enabled {
            return Ok(None);
        }
        self.sync(devices, SyncMode::PushPull, None).map(Some)
    }

    fn sync_device(&self, device: &DeviceId, mode: SyncMode, timeout_ms: u64) -> SyncStatus {
        if !self.transport.is_reachable(device) {
            return SyncStatus::Unreachable;
        }

        if mode.pulls() {
            let cursor = self.store.pull_cursor(device);
            match self.transport.pull(device, cursor, timeout_ms) {
                Ok(records) => {
                    if !records.is_empty() {
                        if self.store.apply_remote(device, &records).is_err() {
                            return SyncStatus::Failed;
                        }
                        let max_seq = records.iter().map(|r| r.sequence).max().unwrap_or(cursor);
                        if self.store.set_pull_cursor(device, max_seq).is_err() {
                            return SyncStatus::Failed;
                        }
                    }
                }
                Err(SyncError::Unreachable { .. }) => return SyncStatus::Unreachable,
                Err(_) => return SyncStatus::Failed,
            }
        }

        if mode.pushes() {
            let pending = match self.store.pending_for(device) {
                Ok(pending) => pending,
                Err(_) => return SyncStatus::Failed,
            };
            if !pending.is_empty() {
                match self.transport.push(device, &pending, timeout_ms) {
                    Ok(acked) => {
                        if self.store.acknowledge_pushed(device, acked).is_err() {
                            return SyncStatus::Failed;
                        }
                    }
                    Err(SyncError::Unreachable { .. }) => return SyncStatus::Unreachable,
                    Err(_) => return SyncStatus::Failed,
                }
            }
        }

        SyncStatus::Success
    }
}
