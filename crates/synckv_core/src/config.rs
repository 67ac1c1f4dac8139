//! Manager and store configuration.

use crate::error::{KvError, KvResult};
use std::path::PathBuf;

/// Kind of store, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvStoreType {
    /// One logical map; remote changes merge into it.
    SingleVersion,
    /// One replica per device; reads may target any device's replica.
    DeviceCollaboration,
}

/// Security classification for a store's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SecurityLevel {
    /// Low-sensitivity data.
    S1 = 1,
    /// General data.
    S2 = 2,
    /// Sensitive data.
    S3 = 3,
    /// Critical data.
    S4 = 4,
}

impl SecurityLevel {
    /// Converts a stored byte back to a security level.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::S1),
            2 => Some(Self::S2),
            3 => Some(Self::S3),
            4 => Some(Self::S4),
            _ => None,
        }
    }

    /// Returns the byte stored in the manifest.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Options supplied when opening or creating a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Create on-disk structures if the store does not exist yet.
    pub create_if_missing: bool,
    /// Whether the store's data is classified as encrypted at rest.
    ///
    /// Recorded in the manifest and checked on reopen; selecting a
    /// cipher is outside this engine.
    pub encrypt: bool,
    /// Whether backup/restore is permitted for this store.
    pub backup: bool,
    /// Whether the store participates in ambient synchronization.
    pub auto_sync: bool,
    /// Kind of store.
    pub kv_store_type: KvStoreType,
    /// Security classification.
    pub security_level: SecurityLevel,
    /// Opaque schema string; empty means untyped.
    pub schema: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            encrypt: false,
            backup: true,
            auto_sync: false,
            kv_store_type: KvStoreType::SingleVersion,
            security_level: SecurityLevel::S2,
            schema: String::new(),
        }
    }
}

impl Options {
    /// Sets the store type.
    #[must_use]
    pub fn kv_store_type(mut self, kind: KvStoreType) -> Self {
        self.kv_store_type = kind;
        self
    }

    /// Sets the security level.
    #[must_use]
    pub fn security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    /// Sets whether missing stores are created.
    #[must_use]
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets the encrypt flag.
    #[must_use]
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// Sets whether backups are permitted.
    #[must_use]
    pub fn backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Sets ambient sync participation.
    #[must_use]
    pub fn auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = auto_sync;
        self
    }

    /// Sets the schema string.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}

/// Configuration for a [`crate::KvManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Namespace owning the manager's stores.
    pub bundle_name: String,
    /// Root directory for persistent stores; `None` keeps all stores
    /// in memory.
    pub base_dir: Option<PathBuf>,
}

impl ManagerConfig {
    /// Creates a configuration for in-memory stores.
    pub fn new(bundle_name: impl Into<String>) -> KvResult<Self> {
        let bundle_name = bundle_name.into();
        if bundle_name.is_empty() {
            return Err(KvError::invalid_argument("bundle name must not be empty"));
        }
        Ok(Self {
            bundle_name,
            base_dir: None,
        })
    }

    /// Sets the root directory for persistent stores.
    #[must_use]
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = Options::default();
        assert!(options.create_if_missing);
        assert!(!options.encrypt);
        assert_eq!(options.kv_store_type, KvStoreType::SingleVersion);
        assert_eq!(options.security_level, SecurityLevel::S2);
        assert!(options.schema.is_empty());
    }

    #[test]
    fn builder_chain() {
        let options = Options::default()
            .kv_store_type(KvStoreType::DeviceCollaboration)
            .security_level(SecurityLevel::S4)
            .auto_sync(true);
        assert_eq!(options.kv_store_type, KvStoreType::DeviceCollaboration);
        assert_eq!(options.security_level, SecurityLevel::S4);
        assert!(options.auto_sync);
    }

    #[test]
    fn security_level_bytes() {
        for level in [
            SecurityLevel::S1,
            SecurityLevel::S2,
            SecurityLevel::S3,
            SecurityLevel::S4,
        ] {
            assert_eq!(SecurityLevel::from_byte(level.as_byte()), Some(level));
        }
        assert_eq!(SecurityLevel::from_byte(0), None);
    }

    #[test]
    fn empty_bundle_name_rejected() {
        assert!(ManagerConfig::new("").is_err());
    }
}
