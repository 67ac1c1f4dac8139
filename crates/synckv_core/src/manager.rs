//! Store lifecycle management.

use crate::config::{ManagerConfig, Options};
use crate::dir::StoreDir;
use crate::error::{KvError, KvResult};
use crate::manifest::StoreManifest;
use crate::store::KvStore;
use crate::types::StoreId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Creates, opens, closes, and deletes the stores of one bundle.
///
/// A manager is an explicit session object: callers own it and the
/// store handles it hands out; there is no process-wide registry.
/// Re-requesting an open store returns the same handle, and the same
/// `(bundle, store_id)` pair names the same on-disk data until
/// [`delete_store`](Self::delete_store) removes it - closing alone
/// never deletes data.
pub struct KvManager {
    config: ManagerConfig,
    stores: Mutex<HashMap<String, Arc<KvStore>>>,
}

impl KvManager {
    /// Creates a manager for the configured bundle.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// The bundle this manager serves.
    #[must_use]
    pub fn bundle_name(&self) -> &str {
        &self.config.bundle_name
    }

    fn store_path(&self, store_id: &StoreId) -> Option<PathBuf> {
        self.config
            .base_dir
            .as_ref()
            .map(|base| base.join(&self.config.bundle_name).join(store_id.as_str()))
    }

    fn ensure_bundle(&self, bundle_name: &str) -> KvResult<()> {
        if bundle_name != self.config.bundle_name {
            return Err(KvError::invalid_argument(format!(
                "bundle {bundle_name} is not served by this manager"
            )));
        }
        Ok(())
    }

    /// Opens a store, creating it when permitted.
    ///
    /// Re-opening an already-open store returns the existing handle;
    /// its options must agree with the original ones on store type and
    /// encrypt flag.
    pub fn get_store(&self, store_id: &str, options: Options) -> KvResult<Arc<KvStore>> {
        let store_id = StoreId::new(store_id)?;
        let mut stores = self.stores.lock();

        if let Some(existing) = stores.get(store_id.as_str()) {
            if existing.is_open() {
                if existing.options().kv_store_type != options.kv_store_type
                    || existing.options().encrypt != options.encrypt
                {
                    return Err(KvError::invalid_operation(
                        "store is already open with conflicting options",
                    ));
                }
                return Ok(Arc::clone(existing));
            }
            stores.remove(store_id.as_str());
        }

        let dir = match self.store_path(&store_id) {
            Some(path) => {
                let dir = StoreDir::open(&path, options.create_if_missing)?;
                match dir.load_manifest()? {
                    Some(manifest) => {
                        if manifest.store_type != options.kv_store_type
                            || manifest.encrypt != options.encrypt
                        {
                            return Err(KvError::invalid_operation(
                                "store exists with conflicting options",
                            ));
                        }
                    }
                    None => {
                        if !options.create_if_missing {
                            return Err(KvError::invalid_operation(format!(
                                "store {store_id} does not exist"
                            )));
                        }
                        dir.save_manifest(&StoreManifest {
                            store_type: options.kv_store_type,
                            security_level: options.security_level,
                            encrypt: options.encrypt,
                            schema: options.schema.clone(),
                        })?;
                    }
                }
                Some(dir)
            }
            None => None,
        };

        let store = KvStore::open(
            self.config.bundle_name.clone(),
            store_id.clone(),
            options,
            dir,
        )?;
        stores.insert(store_id.as_str().to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Closes a store. Its data stays on disk; every outstanding handle,
    /// cursor, transaction, and subscription observes the close.
    pub fn close_store(&self, bundle_name: &str, store_id: &str) -> KvResult<()> {
        self.ensure_bundle(bundle_name)?;
        let store_id = StoreId::new(store_id)?;
        if let Some(store) = self.stores.lock().remove(store_id.as_str()) {
            store.close()?;
        }
        Ok(())
    }

    /// Deletes a store and its on-disk data, closing it first.
    pub fn delete_store(&self, bundle_name: &str, store_id: &str) -> KvResult<()> {
        self.ensure_bundle(bundle_name)?;
        let store_id = StoreId::new(store_id)?;
        if let Some(store) = self.stores.lock().remove(store_id.as_str()) {
            store.close()?;
        }
        if let Some(path) = self.store_path(&store_id) {
            if path.exists() {
                std::fs::remove_dir_all(&path)?;
            }
        }
        tracing::info!(store_id = %store_id, "store deleted");
        Ok(())
    }

    /// Lists every store of the bundle: open handles plus on-disk
    /// directories.
    pub fn get_all_store_ids(&self) -> KvResult<Vec<String>> {
        let mut ids: Vec<String> = self.stores.lock().keys().cloned().collect();

        if let Some(base) = &self.config.base_dir {
            let bundle_dir = base.join(&self.config.bundle_name);
            if bundle_dir.is_dir() {
                for entry in std::fs::read_dir(bundle_dir)? {
                    let entry = entry?;
                    if entry.path().is_dir() {
                        if let Some(name) = entry.file_name().to_str() {
                            ids.push(name.to_string());
                        }
                    }
                }
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

impl std::fmt::Debug for KvManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvManager")
            .field("bundle_name", &self.config.bundle_name)
            .field("open_stores", &self.stores.lock().len())
            .finish_non_exhaustive()
    }
}
