//! Store directory management.
//!
//! Each persistent store owns one directory:
//!
//! ```text
//! <base>/<bundle>/<store_id>/
//! ├─ MANIFEST     # store type, security level, encrypt flag, schema
//! ├─ LOCK         # advisory lock, one process at a time
//! ├─ store.log    # durability log
//! └─ backups/     # named backup files
//! ```

use crate::error::{KvError, KvResult};
use crate::manifest::StoreManifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "store.log";
const BACKUPS_DIR: &str = "backups";

/// Holds a store directory and its exclusive advisory lock.
#[derive(Debug)]
pub(crate) struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and takes the lock.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> KvResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(KvError::invalid_operation(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(KvError::invalid_operation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(KvError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    pub(crate) fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    pub(crate) fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    pub(crate) fn backups_dir(&self) -> PathBuf {
        self.path.join(BACKUPS_DIR)
    }

    pub(crate) fn backup_path(&self, name: &str) -> PathBuf {
        self.backups_dir().join(format!("{name}.bak"))
    }

    /// Whether the directory has never held a store.
    pub(crate) fn is_new_store(&self) -> bool {
        !self.manifest_path().exists()
    }

    /// Loads the manifest, or `None` for a new store.
    pub(crate) fn load_manifest(&self) -> KvResult<Option<StoreManifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let mut data = Vec::new();
        File::open(&path)?.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(StoreManifest::decode(&data)?))
    }

    /// Saves the manifest atomically (temp file, rename, dir fsync).
    pub(crate) fn save_manifest(&self, manifest: &StoreManifest) -> KvResult<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);
        let mut file = File::create(&temp_path)?;
        file.write_all(&manifest.encode())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, self.manifest_path())?;
        self.sync_directory()?;
        Ok(())
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> KvResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> KvResult<()> {
        // NTFS journals metadata; no directory fsync available.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KvStoreType, SecurityLevel};
    use tempfile::tempdir;

    fn manifest() -> StoreManifest {
        StoreManifest {
            store_type: KvStoreType::SingleVersion,
            security_level: SecurityLevel::S2,
            encrypt: false,
            schema: String::new(),
        }
    }

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store1");
        let dir = StoreDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(dir.is_new_store());
    }

    #[test]
    fn open_without_create_fails_for_missing() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing");
        assert!(StoreDir::open(&path, false).is_err());
    }

    #[test]
    fn lock_excludes_second_opener() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("locked");
        let _first = StoreDir::open(&path, true).unwrap();
        assert!(matches!(
            StoreDir::open(&path, true),
            Err(KvError::StoreLocked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("relock");
        {
            let _dir = StoreDir::open(&path, true).unwrap();
        }
        assert!(StoreDir::open(&path, true).is_ok());
    }

    #[test]
    fn manifest_persists() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("manifested");
        let dir = StoreDir::open(&path, true).unwrap();
        assert!(dir.load_manifest().unwrap().is_none());

        dir.save_manifest(&manifest()).unwrap();
        assert!(!dir.is_new_store());
        assert_eq!(dir.load_manifest().unwrap(), Some(manifest()));
    }

    #[test]
    fn paths() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("paths");
        let dir = StoreDir::open(&path, true).unwrap();
        assert_eq!(dir.log_path(), path.join("store.log"));
        assert_eq!(dir.backup_path("nightly"), path.join("backups/nightly.bak"));
    }
}
