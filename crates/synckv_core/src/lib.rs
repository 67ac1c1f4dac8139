//! # synckv Core
//!
//! Embedded, transactional, multi-device-synchronizing key-value store
//! engine.
//!
//! This crate provides:
//! - An ordered per-device replica map with a crash-safe durability log
//! - Point, batch, and prefix/predicate operations
//! - A single-active-transaction manager with atomic commit/rollback
//! - Snapshot result-set cursors with bidirectional navigation
//! - A bounded change-notification hub with local/remote filtering
//! - The store-side surface a sync driver replicates through
//! - Manager-owned store lifecycle (open, close, delete, backup)
//!
//! ## Usage
//!
//! ```
//! use synckv_core::{KvManager, ManagerConfig, Options, Value};
//!
//! let manager = KvManager::new(ManagerConfig::new("com.example.app").unwrap());
//! let store = manager.get_store("storeId1", Options::default()).unwrap();
//!
//! store.put("k", Value::from("v")).unwrap();
//! assert_eq!(store.get("k").unwrap(), Value::from("v"));
//!
//! manager.close_store("com.example.app", "storeId1").unwrap();
//! assert!(store.get("k").is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod config;
mod dir;
mod engine;
mod error;
mod log;
mod manager;
mod manifest;
mod oplog;
mod query;
mod result_set;
mod store;
mod subscription;
mod transaction;
mod types;

pub use backup::{BACKUP_MAGIC, BACKUP_VERSION};
pub use config::{KvStoreType, ManagerConfig, Options, SecurityLevel};
pub use error::{
    KvError, KvResult, CODE_CORRUPTED, CODE_INTERNAL, CODE_INVALID_ARGUMENT, CODE_NOT_FOUND,
    CODE_STORE_CLOSED, CODE_TOO_MANY_SUBSCRIPTIONS,
};
pub use manager::KvManager;
pub use oplog::{SyncOp, SyncRecord};
pub use query::{Query, SortOrder};
pub use result_set::KvStoreResultSet;
pub use store::{KvStore, SyncRange, SyncSettings, MAX_VALUE_LENGTH};
pub use subscription::{
    ChangeNotification, DataChangeCallback, SubscribeType, SubscriptionId, SyncCompleteCallback,
    MAX_DATA_SUBSCRIPTIONS,
};
pub use transaction::TransactionState;
pub use types::{
    ChangeOrigin, DeviceId, SequenceNumber, StoreId, SyncOutcome, SyncStatus, LOCAL_DEVICE_ID,
    MAX_STORE_ID_LENGTH,
};

// Re-exported so callers need only this crate for everyday use.
pub use synckv_codec::{Entry, Key, Value, ValueType};
