//! The ordered-map storage engine behind a store.
//!
//! One engine owns every device replica of a store: a `BTreeMap` per
//! device keyed by [`Key`], which makes prefix scans and cursors observe
//! byte-lexicographic order for free. All committed mutations go through
//! the durability log before touching the maps; opening an engine
//! replays the log.

use crate::error::{KvError, KvResult};
use crate::log::{LogRecord, StoreLog};
use crate::query::{Query, SortOrder};
use crate::types::{DeviceId, SequenceNumber};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use synckv_codec::{decode, Entry, Key};
use synckv_storage::StorageBackend;

/// A buffered mutation, keyed and encoded but not yet committed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mutation {
    /// Insert or update.
    Put {
        /// Key written.
        key: Key,
        /// Encoded value bytes.
        value: Vec<u8>,
    },
    /// Removal. Deleting an absent key is a no-op.
    Delete {
        /// Key removed.
        key: Key,
    },
}

/// Net effect of one committed batch, for change notifications.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    pub inserts: Vec<Entry>,
    pub updates: Vec<Entry>,
    pub deletes: Vec<Entry>,
}

impl ChangeSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

type Replica = BTreeMap<Key, Vec<u8>>;

pub(crate) struct Engine {
    replicas: RwLock<BTreeMap<DeviceId, Replica>>,
    log: StoreLog,
    next_seq: AtomicU64,
}

impl Engine {
    /// Opens an engine over the given backend, replaying committed
    /// batches and truncating any torn tail.
    pub(crate) fn open(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> KvResult<Self> {
        let log = StoreLog::new(backend, sync_on_commit);
        let (records, committed_end) = log.read_committed()?;
        log.truncate(committed_end)?;

        let mut replicas: BTreeMap<DeviceId, Replica> = BTreeMap::new();
        replicas.insert(DeviceId::local(), Replica::new());
        let mut max_seq = 0u64;

        for record in records {
            match record {
                LogRecord::Put { device, key, value } => {
                    replicas.entry(device).or_default().insert(key, value);
                }
                LogRecord::Delete { device, key } => {
                    if let Some(replica) = replicas.get_mut(&device) {
                        replica.remove(&key);
                    }
                }
                LogRecord::Clear { device } => {
                    if device.is_local() {
                        replicas.insert(device, Replica::new());
                    } else {
                        replicas.remove(&device);
                    }
                }
                LogRecord::Commit { sequence } => {
                    max_seq = max_seq.max(sequence.as_u64());
                }
            }
        }

        tracing::debug!(replayed_seq = max_seq, "engine opened");

        Ok(Self {
            replicas: RwLock::new(replicas),
            log,
            next_seq: AtomicU64::new(max_seq + 1),
        })
    }

    /// Commits a batch of mutations against one device's replica.
    ///
    /// The batch is logged and flushed before the in-memory maps change,
    /// then applied while holding the write lock, so readers never see a
    /// partial batch. Returns the batch's net effect.
    pub(crate) fn commit(
        &self,
        device: &DeviceId,
        mutations: Vec<Mutation>,
    ) -> KvResult<ChangeSet> {
        let mut replicas = self.replicas.write();

        if !mutations.is_empty() {
            let sequence = SequenceNumber::new(self.next_seq.fetch_add(1, Ordering::SeqCst));
            for mutation in &mutations {
                let record = match mutation {
                    Mutation::Put { key, value } => LogRecord::Put {
                        device: device.clone(),
                        key: key.clone(),
                        value: value.clone(),
                    },
                    Mutation::Delete { key } => LogRecord::Delete {
                        device: device.clone(),
                        key: key.clone(),
                    },
                };
                self.log.append(&record)?;
            }
            self.log.append(&LogRecord::Commit { sequence })?;
            self.log.flush()?;
        }

        let replica = replicas.entry(device.clone()).or_default();
        let mut changes = ChangeSet::default();
        for mutation in mutations {
            match mutation {
                Mutation::Put { key, value } => {
                    let decoded = decode(&value)?;
                    let previous = replica.insert(key.clone(), value);
                    let entry = Entry::new(key, decoded);
                    if previous.is_some() {
                        changes.updates.push(entry);
                    } else {
                        changes.inserts.push(entry);
                    }
                }
                Mutation::Delete { key } => {
                    if let Some(old) = replica.remove(&key) {
                        changes.deletes.push(Entry::new(key, decode(&old)?));
                    }
                }
            }
        }
        Ok(changes)
    }

    /// Reads one key from one device's replica.
    pub(crate) fn get(&self, device: &DeviceId, key: &Key) -> KvResult<Vec<u8>> {
        let replicas = self.replicas.read();
        replicas
            .get(device)
            .and_then(|replica| replica.get(key))
            .cloned()
            .ok_or_else(|| KvError::not_found(key.as_str()))
    }

    /// Returns the entries matching `query` in the device's replica.
    pub(crate) fn select(&self, device: &DeviceId, query: &Query) -> KvResult<Vec<Entry>> {
        let replicas = self.replicas.read();
        let Some(replica) = replicas.get(device) else {
            return Ok(Vec::new());
        };

        let matching = replica
            .iter()
            .filter(|(key, _)| query.matches(key.as_str()));
        let ordered: Vec<(&Key, &Vec<u8>)> = match query.order {
            SortOrder::Asc => matching.collect(),
            SortOrder::Desc => {
                let mut v: Vec<_> = matching.collect();
                v.reverse();
                v
            }
        };

        ordered
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(key, value)| Ok(Entry::new(key.clone(), decode(value)?)))
            .collect()
    }

    /// Counts the entries matching `query` without decoding values.
    pub(crate) fn count(&self, device: &DeviceId, query: &Query) -> usize {
        let replicas = self.replicas.read();
        let Some(replica) = replicas.get(device) else {
            return 0;
        };
        let matching = replica
            .keys()
            .filter(|key| query.matches(key.as_str()))
            .count();
        let after_offset = matching.saturating_sub(query.offset);
        after_offset.min(query.limit.unwrap_or(usize::MAX))
    }

    /// Purges a device's replica. Returns the number of entries removed,
    /// or `None` if no data for the device exists.
    pub(crate) fn clear_replica(&self, device: &DeviceId) -> KvResult<Option<usize>> {
        let mut replicas = self.replicas.write();
        if !replicas.contains_key(device) {
            return Ok(None);
        }
        let sequence = SequenceNumber::new(self.next_seq.fetch_add(1, Ordering::SeqCst));
        self.log.append(&LogRecord::Clear {
            device: device.clone(),
        })?;
        self.log.append(&LogRecord::Commit { sequence })?;
        self.log.flush()?;
        let removed = replicas.remove(device).map(|r| r.len()).unwrap_or(0);
        if device.is_local() {
            replicas.insert(DeviceId::local(), Replica::new());
        }
        Ok(Some(removed))
    }

    /// Replaces the local replica wholesale (restore path).
    ///
    /// Logged as a clear plus the new entries in one batch; the returned
    /// change set is the diff between old and new contents.
    pub(crate) fn replace_local(&self, entries: Vec<(Key, Vec<u8>)>) -> KvResult<ChangeSet> {
        let mut replicas = self.replicas.write();
        let local = DeviceId::local();

        let sequence = SequenceNumber::new(self.next_seq.fetch_add(1, Ordering::SeqCst));
        self.log.append(&LogRecord::Clear {
            device: local.clone(),
        })?;
        for (key, value) in &entries {
            self.log.append(&LogRecord::Put {
                device: local.clone(),
                key: key.clone(),
                value: value.clone(),
            })?;
        }
        self.log.append(&LogRecord::Commit { sequence })?;
        self.log.flush()?;

        let new: Replica = entries.into_iter().collect();
        let old = replicas
            .insert(local.clone(), new.clone())
            .unwrap_or_default();

        let mut changes = ChangeSet::default();
        for (key, value) in &new {
            match old.get(key) {
                None => changes.inserts.push(Entry::new(key.clone(), decode(value)?)),
                Some(previous) if previous != value => {
                    changes.updates.push(Entry::new(key.clone(), decode(value)?));
                }
                Some(_) => {}
            }
        }
        for (key, value) in &old {
            if !new.contains_key(key) {
                changes.deletes.push(Entry::new(key.clone(), decode(value)?));
            }
        }
        Ok(changes)
    }

    /// Returns the local replica's raw contents (backup path).
    pub(crate) fn snapshot_local(&self) -> Vec<(Key, Vec<u8>)> {
        let replicas = self.replicas.read();
        replicas
            .get(&DeviceId::local())
            .map(|replica| replica.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Flushes the durability log.
    pub(crate) fn flush(&self) -> KvResult<()> {
        self.log.flush()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("next_seq", &self.next_seq.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synckv_codec::{encode, Value};
    use synckv_storage::InMemoryBackend;

    fn engine() -> Engine {
        Engine::open(Box::new(InMemoryBackend::new()), false).unwrap()
    }

    fn put(key: &str, value: Value) -> Mutation {
        Mutation::Put {
            key: Key::new(key).unwrap(),
            value: encode(&value),
        }
    }

    fn delete(key: &str) -> Mutation {
        Mutation::Delete {
            key: Key::new(key).unwrap(),
        }
    }

    #[test]
    fn commit_then_get() {
        let engine = engine();
        let local = DeviceId::local();
        engine
            .commit(&local, vec![put("k", Value::from("v"))])
            .unwrap();
        let bytes = engine.get(&local, &Key::new("k").unwrap()).unwrap();
        assert_eq!(decode(&bytes).unwrap(), Value::from("v"));
    }

    #[test]
    fn get_missing_is_not_found() {
        let engine = engine();
        let err = engine
            .get(&DeviceId::local(), &Key::new("absent").unwrap())
            .unwrap_err();
        assert!(matches!(err, KvError::NotFound { .. }));
    }

    #[test]
    fn changeset_distinguishes_insert_and_update() {
        let engine = engine();
        let local = DeviceId::local();

        let changes = engine
            .commit(&local, vec![put("k", Value::from(1i64))])
            .unwrap();
        assert_eq!(changes.inserts.len(), 1);
        assert!(changes.updates.is_empty());

        let changes = engine
            .commit(&local, vec![put("k", Value::from(2i64))])
            .unwrap();
        assert!(changes.inserts.is_empty());
        assert_eq!(changes.updates.len(), 1);
    }

    #[test]
    fn delete_of_absent_key_changes_nothing() {
        let engine = engine();
        let changes = engine.commit(&DeviceId::local(), vec![delete("nope")]).unwrap();
        assert!(changes.deletes.is_empty());
    }

    #[test]
    fn select_orders_by_key_bytes() {
        let engine = engine();
        let local = DeviceId::local();
        engine
            .commit(
                &local,
                vec![
                    put("b", Value::from(2i64)),
                    put("a", Value::from(1i64)),
                    put("c", Value::from(3i64)),
                ],
            )
            .unwrap();

        let entries = engine.select(&local, &Query::new()).unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["a", "b", "c"]);

        let entries = engine
            .select(&local, &Query::new().order(SortOrder::Desc))
            .unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["c", "b", "a"]);
    }

    #[test]
    fn count_matches_select_len() {
        let engine = engine();
        let local = DeviceId::local();
        let mutations = (0..10)
            .map(|i| put(&format!("batch_test_string_key{i}"), Value::from("x")))
            .collect();
        engine.commit(&local, mutations).unwrap();
        engine
            .commit(&local, vec![put("other", Value::from("y"))])
            .unwrap();

        let query = Query::new().prefix_key("batch_test");
        assert_eq!(engine.count(&local, &query), 10);
        assert_eq!(engine.select(&local, &query).unwrap().len(), 10);
    }

    #[test]
    fn count_honors_limit_and_offset() {
        let engine = engine();
        let local = DeviceId::local();
        let mutations = (0..10)
            .map(|i| put(&format!("key{i}"), Value::from(i64::from(i))))
            .collect::<Vec<_>>();
        engine.commit(&local, mutations).unwrap();

        let query = Query::new().limit(4, 8);
        assert_eq!(engine.count(&local, &query), 2);
        assert_eq!(engine.select(&local, &query).unwrap().len(), 2);
    }

    #[test]
    fn replicas_are_isolated() {
        let engine = engine();
        let local = DeviceId::local();
        let remote = DeviceId::new("deviceA").unwrap();
        engine
            .commit(&local, vec![put("k", Value::from("local"))])
            .unwrap();
        engine
            .commit(&remote, vec![put("k", Value::from("remote"))])
            .unwrap();

        let local_bytes = engine.get(&local, &Key::new("k").unwrap()).unwrap();
        let remote_bytes = engine.get(&remote, &Key::new("k").unwrap()).unwrap();
        assert_eq!(decode(&local_bytes).unwrap(), Value::from("local"));
        assert_eq!(decode(&remote_bytes).unwrap(), Value::from("remote"));
    }

    #[test]
    fn clear_replica_removes_only_that_device() {
        let engine = engine();
        let local = DeviceId::local();
        let remote = DeviceId::new("deviceA").unwrap();
        engine
            .commit(&local, vec![put("k", Value::from("keep"))])
            .unwrap();
        engine
            .commit(&remote, vec![put("k", Value::from("drop"))])
            .unwrap();

        assert_eq!(engine.clear_replica(&remote).unwrap(), Some(1));
        assert!(engine.get(&remote, &Key::new("k").unwrap()).is_err());
        assert!(engine.get(&local, &Key::new("k").unwrap()).is_ok());
    }

    #[test]
    fn clear_replica_of_unknown_device_returns_none() {
        let engine = engine();
        let ghost = DeviceId::new("ghost").unwrap();
        assert_eq!(engine.clear_replica(&ghost).unwrap(), None);
    }

    #[test]
    fn replay_restores_committed_state() {
        let mut backing = Vec::new();
        {
            let engine = Engine::open(Box::new(InMemoryBackend::new()), false).unwrap();
            engine
                .commit(
                    &DeviceId::local(),
                    vec![put("a", Value::from(1i64)), put("b", Value::from(2i64))],
                )
                .unwrap();
            engine
                .commit(&DeviceId::local(), vec![delete("a")])
                .unwrap();
            // Capture the raw log bytes to seed a new engine.
            let backend = engine.log_backend_bytes();
            backing.extend_from_slice(&backend);
        }

        let engine =
            Engine::open(Box::new(InMemoryBackend::with_data(backing)), false).unwrap();
        let local = DeviceId::local();
        assert!(engine.get(&local, &Key::new("a").unwrap()).is_err());
        let bytes = engine.get(&local, &Key::new("b").unwrap()).unwrap();
        assert_eq!(decode(&bytes).unwrap(), Value::from(2i64));
    }

    #[test]
    fn replace_local_diffs_old_and_new() {
        let engine = engine();
        let local = DeviceId::local();
        engine
            .commit(
                &local,
                vec![
                    put("stays", Value::from(1i64)),
                    put("changes", Value::from(1i64)),
                    put("goes", Value::from(1i64)),
                ],
            )
            .unwrap();

        let snapshot = vec![
            (Key::new("stays").unwrap(), encode(&Value::from(1i64))),
            (Key::new("changes").unwrap(), encode(&Value::from(2i64))),
            (Key::new("arrives").unwrap(), encode(&Value::from(3i64))),
        ];
        let changes = engine.replace_local(snapshot).unwrap();

        let inserted: Vec<&str> = changes.inserts.iter().map(|e| e.key.as_str()).collect();
        let updated: Vec<&str> = changes.updates.iter().map(|e| e.key.as_str()).collect();
        let deleted: Vec<&str> = changes.deletes.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(inserted, ["arrives"]);
        assert_eq!(updated, ["changes"]);
        assert_eq!(deleted, ["goes"]);
    }
}

#[cfg(test)]
impl Engine {
    /// Raw log contents, for replay tests.
    fn log_backend_bytes(&self) -> Vec<u8> {
        let backend = self.log.backend_for_testing();
        let size = backend.size().unwrap();
        backend.read_at(0, size as usize).unwrap()
    }
}
