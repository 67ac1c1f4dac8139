//! The store handle: every operation a caller performs on one store.

use crate::backup::{decode_backup, encode_backup};
use crate::config::{KvStoreType, Options, SecurityLevel};
use crate::dir::StoreDir;
use crate::engine::{Engine, Mutation};
use crate::error::{KvError, KvResult, CODE_NOT_FOUND};
use crate::oplog::{SyncOp, SyncOplog, SyncRecord};
use crate::query::Query;
use crate::result_set::KvStoreResultSet;
use crate::subscription::{
    ChangeNotification, DataChangeCallback, NotificationHub, SubscribeType, SubscriptionId,
    SyncCompleteCallback,
};
use crate::transaction::{TransactionManager, TransactionState};
use crate::types::{ChangeOrigin, DeviceId, StoreId, SyncOutcome};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synckv_codec::{decode, encode, Entry, Key, Value};
use synckv_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// Maximum encoded value size in bytes.
pub const MAX_VALUE_LENGTH: usize = 4 * 1024 * 1024;

/// Label sets restricting which peers this store will synchronize with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRange {
    /// Labels this store carries.
    pub local_labels: BTreeSet<String>,
    /// Labels a peer must support.
    pub remote_support_labels: BTreeSet<String>,
}

impl SyncRange {
    /// Whether any peer is eligible: the label sets must intersect.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.local_labels
            .intersection(&self.remote_support_labels)
            .next()
            .is_some()
    }
}

/// Sync configuration of one store, read by the sync driver.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Whether ambient (automatic) sync is enabled.
    pub enabled: bool,
    /// Label restriction, if one was declared.
    pub range: Option<SyncRange>,
    /// Default batching delay for sync passes, in milliseconds.
    pub allowed_delay_ms: u64,
}

impl SyncSettings {
    fn new(auto_sync: bool) -> Self {
        Self {
            enabled: auto_sync,
            range: None,
            allowed_delay_ms: 0,
        }
    }

    /// Whether peers are eligible under the declared label range.
    ///
    /// An undeclared range places no restriction.
    #[must_use]
    pub fn peers_eligible(&self) -> bool {
        self.range.as_ref().map_or(true, SyncRange::is_eligible)
    }
}

/// A handle to one open store.
///
/// All operations are serialized internally; the handle is cheap to
/// share via `Arc` and safe to use from multiple threads. After
/// [`KvManager::close_store`](crate::KvManager::close_store) every
/// operation on the handle fails with [`KvError::StoreClosed`] - the
/// data itself survives on disk until the store is deleted.
pub struct KvStore {
    bundle_name: String,
    store_id: StoreId,
    options: Options,
    engine: Engine,
    txn: TransactionManager,
    hub: NotificationHub,
    oplog: Mutex<SyncOplog>,
    sync_settings: RwLock<SyncSettings>,
    open: Arc<AtomicBool>,
    // Present while a persistent store is open; taken on close so the
    // directory lock is released.
    dir: Mutex<Option<StoreDir>>,
}

impl KvStore {
    pub(crate) fn open(
        bundle_name: String,
        store_id: StoreId,
        options: Options,
        dir: Option<StoreDir>,
    ) -> KvResult<Arc<Self>> {
        let backend: Box<dyn StorageBackend> = match &dir {
            Some(dir) => Box::new(FileBackend::open_with_create_dirs(&dir.log_path())?),
            None => Box::new(InMemoryBackend::new()),
        };
        let engine = Engine::open(backend, dir.is_some())?;
        let auto_sync = options.auto_sync;

        tracing::info!(store_id = %store_id, bundle = %bundle_name, "store opened");

        Ok(Arc::new(Self {
            bundle_name,
            store_id,
            options,
            engine,
            txn: TransactionManager::new(),
            hub: NotificationHub::new(),
            oplog: Mutex::new(SyncOplog::new()),
            sync_settings: RwLock::new(SyncSettings::new(auto_sync)),
            open: Arc::new(AtomicBool::new(true)),
            dir: Mutex::new(dir),
        }))
    }

    /// The store's id.
    #[must_use]
    pub fn store_id(&self) -> &str {
        self.store_id.as_str()
    }

    /// The bundle owning this store.
    #[must_use]
    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    /// The options the store was opened with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Whether the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> KvResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(KvError::StoreClosed)
        }
    }

    fn validate_key(key: &str) -> KvResult<Key> {
        Ok(Key::new(key)?)
    }

    fn validate_value(value: &Value) -> KvResult<Vec<u8>> {
        let bytes = encode(value);
        if bytes.len() > MAX_VALUE_LENGTH {
            return Err(KvError::invalid_argument(format!(
                "encoded value is {} bytes, maximum is {MAX_VALUE_LENGTH}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Resolves which replica a device-scoped operation targets.
    fn resolve_device(&self, device: &DeviceId) -> KvResult<DeviceId> {
        if device.is_local() {
            return Ok(DeviceId::local());
        }
        if self.options.kv_store_type != KvStoreType::DeviceCollaboration {
            return Err(KvError::invalid_argument(
                "device-scoped access requires a device-collaboration store",
            ));
        }
        Ok(device.clone())
    }

    /// Applies local mutations: stage into the active transaction, or
    /// commit as one batch with a single aggregated notification.
    fn write_local(&self, mutations: Vec<Mutation>) -> KvResult<()> {
        if self.txn.stage(&mutations) {
            return Ok(());
        }
        self.commit_local(mutations)
    }

    fn commit_local(&self, mutations: Vec<Mutation>) -> KvResult<()> {
        let sync_ops: Vec<SyncOp> = mutations
            .iter()
            .map(|mutation| match mutation {
                Mutation::Put { key, value } => SyncOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
                Mutation::Delete { key } => SyncOp::Delete { key: key.clone() },
            })
            .collect();

        let changes = self.engine.commit(&DeviceId::local(), mutations)?;

        {
            let mut oplog = self.oplog.lock();
            for op in sync_ops {
                oplog.record(op);
            }
        }

        if !changes.is_empty() {
            let notification = ChangeNotification {
                device_id: DeviceId::local(),
                inserts: changes.inserts,
                updates: changes.updates,
                deletes: changes.deletes,
            };
            self.hub
                .notify_data_change(&ChangeOrigin::Local, &notification);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Point operations
    // ------------------------------------------------------------------

    /// Upserts one key.
    pub fn put(&self, key: &str, value: Value) -> KvResult<()> {
        let key = Self::validate_key(key)?;
        let bytes = Self::validate_value(&value)?;
        self.ensure_open()?;
        self.write_local(vec![Mutation::Put { key, value: bytes }])
    }

    /// Reads one key, returning the exact value type stored.
    pub fn get(&self, key: &str) -> KvResult<Value> {
        let key = Self::validate_key(key)?;
        self.ensure_open()?;

        if let Some(staged) = self.txn.read_through(&key) {
            return match staged {
                Some(bytes) => Ok(decode(&bytes)?),
                None => Err(KvError::not_found(key.as_str())),
            };
        }

        let bytes = self.engine.get(&DeviceId::local(), &key)?;
        Ok(decode(&bytes)?)
    }

    /// Reads one key from the named device's replica
    /// (device-collaboration stores).
    pub fn get_on_device(&self, device: &DeviceId, key: &str) -> KvResult<Value> {
        let key = Self::validate_key(key)?;
        let device = self.resolve_device(device)?;
        self.ensure_open()?;
        let bytes = self.engine.get(&device, &key)?;
        Ok(decode(&bytes)?)
    }

    /// Deletes one key. Deleting an absent key succeeds.
    pub fn delete(&self, key: &str) -> KvResult<()> {
        let key = Self::validate_key(key)?;
        self.ensure_open()?;
        self.write_local(vec![Mutation::Delete { key }])
    }

    // ------------------------------------------------------------------
    // Batch operations
    // ------------------------------------------------------------------

    /// Upserts a batch of entries, all-or-nothing.
    ///
    /// Every entry is validated before anything is written; one invalid
    /// entry fails the whole batch with no partial effects.
    pub fn put_batch(&self, entries: &[(String, Value)]) -> KvResult<()> {
        let mut mutations = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = Self::validate_key(key)?;
            let bytes = Self::validate_value(value)?;
            mutations.push(Mutation::Put { key, value: bytes });
        }
        self.ensure_open()?;
        self.write_local(mutations)
    }

    /// Deletes a batch of keys, all-or-nothing.
    pub fn delete_batch(&self, keys: &[String]) -> KvResult<()> {
        let mut mutations = Vec::with_capacity(keys.len());
        for key in keys {
            let key = Self::validate_key(key)?;
            mutations.push(Mutation::Delete { key });
        }
        self.ensure_open()?;
        self.write_local(mutations)
    }

    // ------------------------------------------------------------------
    // Scans, counts, cursors
    // ------------------------------------------------------------------

    /// Returns all entries whose key starts with `prefix`, in key order.
    pub fn get_entries(&self, prefix: &str) -> KvResult<Vec<Entry>> {
        self.get_entries_by_query(&Query::new().prefix_key(prefix))
    }

    /// Returns all entries matching `query`.
    pub fn get_entries_by_query(&self, query: &Query) -> KvResult<Vec<Entry>> {
        let device = match &query.device {
            Some(device) => self.resolve_device(device)?,
            None => DeviceId::local(),
        };
        self.ensure_open()?;
        self.engine.select(&device, query)
    }

    /// Returns the number of entries `query` matches without
    /// materializing them.
    pub fn get_result_size(&self, query: &Query) -> KvResult<usize> {
        let device = match &query.device {
            Some(device) => self.resolve_device(device)?,
            None => DeviceId::local(),
        };
        self.ensure_open()?;
        Ok(self.engine.count(&device, query))
    }

    /// Opens a cursor over the entries whose key starts with `prefix`.
    pub fn get_result_set(&self, prefix: &str) -> KvResult<Arc<KvStoreResultSet>> {
        self.get_result_set_by_query(&Query::new().prefix_key(prefix))
    }

    /// Opens a cursor over the entries matching `query`.
    ///
    /// The cursor sees a fixed snapshot: its count and contents do not
    /// change with later mutations.
    pub fn get_result_set_by_query(&self, query: &Query) -> KvResult<Arc<KvStoreResultSet>> {
        let entries = self.get_entries_by_query(query)?;
        Ok(Arc::new(KvStoreResultSet::new(
            entries,
            Arc::clone(&self.open),
        )))
    }

    /// Closes a cursor. Closing an already-closed cursor is an
    /// argument error.
    pub fn close_result_set(&self, result_set: &KvStoreResultSet) -> KvResult<()> {
        if !result_set.mark_closed() {
            return Err(KvError::invalid_argument(
                "result set is already closed",
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Starts a transaction. Only one may be active per store.
    pub fn start_transaction(&self) -> KvResult<()> {
        self.ensure_open()?;
        self.txn.begin()
    }

    /// Commits the active transaction as one atomic batch.
    ///
    /// However many mutations the transaction buffered, subscribers see
    /// exactly one notification covering the net effect.
    pub fn commit(&self) -> KvResult<()> {
        self.ensure_open()?;
        let mutations = self.txn.take_for_commit()?;
        self.commit_local(mutations)
    }

    /// Discards the active transaction. No notification is emitted for
    /// the discarded mutations.
    pub fn rollback(&self) -> KvResult<()> {
        self.ensure_open()?;
        self.txn.rollback()
    }

    /// Current transaction state.
    #[must_use]
    pub fn transaction_state(&self) -> TransactionState {
        self.txn.state()
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribes to data-change notifications.
    ///
    /// At most [`crate::MAX_DATA_SUBSCRIPTIONS`] concurrent data-change
    /// subscriptions are permitted per store.
    pub fn on_data_change(
        &self,
        filter: SubscribeType,
        callback: DataChangeCallback,
    ) -> KvResult<SubscriptionId> {
        self.ensure_open()?;
        self.hub.subscribe_data_change(filter, callback)
    }

    /// Removes a data-change subscription; unknown handles are ignored.
    pub fn off_data_change(&self, id: SubscriptionId) {
        self.hub.unsubscribe_data_change(id);
    }

    /// Subscribes to sync-completion events.
    pub fn on_sync_complete(&self, callback: SyncCompleteCallback) -> KvResult<SubscriptionId> {
        self.ensure_open()?;
        Ok(self.hub.subscribe_sync_complete(callback))
    }

    /// Removes a sync-completion subscription; unknown handles are
    /// ignored.
    pub fn off_sync_complete(&self, id: SubscriptionId) {
        self.hub.unsubscribe_sync_complete(id);
    }

    // ------------------------------------------------------------------
    // Sync configuration and driver surface
    // ------------------------------------------------------------------

    /// Enables or disables ambient synchronization.
    pub fn enable_sync(&self, enabled: bool) -> KvResult<()> {
        self.ensure_open()?;
        self.sync_settings.write().enabled = enabled;
        Ok(())
    }

    /// Declares the label sets restricting eligible sync peers.
    pub fn set_sync_range(
        &self,
        local_labels: &[String],
        remote_support_labels: &[String],
    ) -> KvResult<()> {
        for label in local_labels.iter().chain(remote_support_labels) {
            if label.is_empty() {
                return Err(KvError::invalid_argument("sync labels must not be empty"));
            }
        }
        self.ensure_open()?;
        self.sync_settings.write().range = Some(SyncRange {
            local_labels: local_labels.iter().cloned().collect(),
            remote_support_labels: remote_support_labels.iter().cloned().collect(),
        });
        Ok(())
    }

    /// Sets the default allowed sync batching delay.
    pub fn set_sync_param(&self, allowed_delay_ms: u64) -> KvResult<()> {
        self.ensure_open()?;
        self.sync_settings.write().allowed_delay_ms = allowed_delay_ms;
        Ok(())
    }

    /// Current sync settings.
    #[must_use]
    pub fn sync_settings(&self) -> SyncSettings {
        self.sync_settings.read().clone()
    }

    /// Purges the named device's replica from this store.
    ///
    /// Data for every other device, including local data, is untouched.
    /// Removing data for a device this store holds nothing from is a
    /// dedicated failure, not a silent success.
    pub fn remove_device_data(&self, device: &DeviceId) -> KvResult<()> {
        if device.is_local() {
            return Err(KvError::invalid_argument(
                "cannot remove this node's own data",
            ));
        }
        self.ensure_open()?;
        match self.engine.clear_replica(device)? {
            Some(removed) => {
                self.oplog.lock().forget_device(device);
                tracing::debug!(device = %device, removed, "device data removed");
                Ok(())
            }
            None => Err(KvError::RemoveDeviceDataFailed {
                device: device.as_str().to_string(),
                message: "no data held for this device".to_string(),
            }),
        }
    }

    /// The store's security classification.
    pub fn get_security_level(&self) -> KvResult<SecurityLevel> {
        self.ensure_open()?;
        Ok(self.options.security_level)
    }

    /// Local operations `device` has not acknowledged yet.
    pub fn pending_for(&self, device: &DeviceId) -> KvResult<Vec<SyncRecord>> {
        self.ensure_open()?;
        Ok(self.oplog.lock().pending_for(device))
    }

    /// Local operations committed after `sequence`, for peers pulling
    /// from this store.
    pub fn changes_since(&self, sequence: u64) -> KvResult<Vec<SyncRecord>> {
        self.ensure_open()?;
        Ok(self.oplog.lock().since(sequence))
    }

    /// Records that `device` acknowledged pushes up to `sequence`.
    pub fn acknowledge_pushed(&self, device: &DeviceId, sequence: u64) -> KvResult<()> {
        self.ensure_open()?;
        self.oplog.lock().acknowledge(device, sequence);
        Ok(())
    }

    /// Drops oplog records every push-acknowledged peer has received.
    ///
    /// Peers that only pull never acknowledge, so call this only in
    /// push-based topologies.
    pub fn compact_oplog(&self) -> KvResult<()> {
        self.ensure_open()?;
        self.oplog.lock().compact();
        Ok(())
    }

    /// Highest remote sequence already pulled from `device`.
    #[must_use]
    pub fn pull_cursor(&self, device: &DeviceId) -> u64 {
        self.oplog.lock().pull_cursor(device)
    }

    /// Advances the pull cursor for `device`.
    pub fn set_pull_cursor(&self, device: &DeviceId, sequence: u64) -> KvResult<()> {
        self.ensure_open()?;
        self.oplog.lock().set_pull_cursor(device, sequence);
        Ok(())
    }

    /// Applies operations pulled from `origin` as one atomic batch.
    ///
    /// Device-collaboration stores write into the origin device's
    /// replica; single-version stores merge into the local map. One
    /// remote-filtered notification covers the whole batch.
    pub fn apply_remote(&self, origin: &DeviceId, records: &[SyncRecord]) -> KvResult<()> {
        if origin.is_local() {
            return Err(KvError::invalid_argument(
                "remote operations cannot originate from the local device",
            ));
        }
        self.ensure_open()?;

        let target = match self.options.kv_store_type {
            KvStoreType::DeviceCollaboration => origin.clone(),
            KvStoreType::SingleVersion => DeviceId::local(),
        };
        let mutations: Vec<Mutation> = records
            .iter()
            .map(|record| match &record.op {
                SyncOp::Put { key, value } => Mutation::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
                SyncOp::Delete { key } => Mutation::Delete { key: key.clone() },
            })
            .collect();

        let changes = self.engine.commit(&target, mutations)?;
        if !changes.is_empty() {
            let notification = ChangeNotification {
                device_id: origin.clone(),
                inserts: changes.inserts,
                updates: changes.updates,
                deletes: changes.deletes,
            };
            self.hub
                .notify_data_change(&ChangeOrigin::Remote(origin.clone()), &notification);
        }
        Ok(())
    }

    /// Delivers per-device sync outcomes to sync-complete subscribers.
    pub fn emit_sync_complete(&self, outcomes: &[SyncOutcome]) {
        self.hub.notify_sync_complete(outcomes);
    }

    // ------------------------------------------------------------------
    // Backup and restore
    // ------------------------------------------------------------------

    fn with_backup_dir<R>(&self, f: impl FnOnce(&StoreDir) -> KvResult<R>) -> KvResult<R> {
        if !self.options.backup {
            return Err(KvError::invalid_operation(
                "backups are disabled for this store",
            ));
        }
        let dir = self.dir.lock();
        let dir = dir.as_ref().ok_or_else(|| {
            KvError::invalid_operation("an in-memory store cannot be backed up")
        })?;
        f(dir)
    }

    fn validate_backup_name(name: &str) -> KvResult<()> {
        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(KvError::invalid_argument(
                "backup names may only contain letters, digits, and underscores",
            ));
        }
        Ok(())
    }

    /// Writes a named snapshot of the local replica.
    pub fn backup(&self, name: &str) -> KvResult<()> {
        Self::validate_backup_name(name)?;
        self.ensure_open()?;

        let bytes = encode_backup(&self.engine.snapshot_local())?;
        self.with_backup_dir(|dir| {
            std::fs::create_dir_all(dir.backups_dir())?;
            let mut file = std::fs::File::create(dir.backup_path(name))?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            Ok(())
        })?;
        tracing::info!(store_id = %self.store_id, name, "backup written");
        Ok(())
    }

    /// Replaces the local replica with a named snapshot's contents.
    pub fn restore(&self, name: &str) -> KvResult<()> {
        Self::validate_backup_name(name)?;
        self.ensure_open()?;

        let bytes = self.with_backup_dir(|dir| {
            let path = dir.backup_path(name);
            if !path.exists() {
                return Err(KvError::not_found(name));
            }
            Ok(std::fs::read(path)?)
        })?;
        let entries = decode_backup(&bytes)?;
        let changes = self.engine.replace_local(entries)?;
        if !changes.is_empty() {
            let notification = ChangeNotification {
                device_id: DeviceId::local(),
                inserts: changes.inserts,
                updates: changes.updates,
                deletes: changes.deletes,
            };
            self.hub
                .notify_data_change(&ChangeOrigin::Local, &notification);
        }
        tracing::info!(store_id = %self.store_id, name, "backup restored");
        Ok(())
    }

    /// Deletes named backups, reporting a status code per name
    /// (0 means deleted).
    pub fn delete_backup(&self, names: &[String]) -> KvResult<Vec<(String, u32)>> {
        self.ensure_open()?;
        self.with_backup_dir(|dir| {
            let mut results = Vec::with_capacity(names.len());
            for name in names {
                let status = if Self::validate_backup_name(name).is_err() {
                    crate::error::CODE_INVALID_ARGUMENT
                } else {
                    let path = dir.backup_path(name);
                    if path.exists() {
                        match std::fs::remove_file(&path) {
                            Ok(()) => 0,
                            Err(_) => crate::error::CODE_INTERNAL,
                        }
                    } else {
                        CODE_NOT_FOUND
                    }
                };
                results.push((name.clone(), status));
            }
            Ok(results)
        })
    }

    // ------------------------------------------------------------------
    // Close
    // ------------------------------------------------------------------

    /// Closes the store: flushes the log, drops subscriptions, discards
    /// any active transaction, and invalidates every cursor. Idempotent.
    pub(crate) fn close(&self) -> KvResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.txn.discard();
        self.hub.clear();
        self.engine.flush()?;
        // Release the directory lock so the store can be reopened.
        self.dir.lock().take();
        tracing::info!(store_id = %self.store_id, "store closed");
        Ok(())
    }
}

impl Drop for KvStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("store_id", &self.store_id)
            .field("bundle_name", &self.bundle_name)
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}
