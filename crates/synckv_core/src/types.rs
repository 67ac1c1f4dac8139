//! Core type definitions.

use crate::error::{KvError, KvResult};
use std::fmt;

/// The reserved device id naming this node's own replica.
pub const LOCAL_DEVICE_ID: &str = "local";

/// Maximum store id length in bytes.
pub const MAX_STORE_ID_LENGTH: usize = 128;

/// Identifies a device participating in synchronization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Validates and creates a device id.
    pub fn new(id: impl Into<String>) -> KvResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(KvError::invalid_argument("device id must not be empty"));
        }
        Ok(Self(id))
    }

    /// Returns the reserved id for this node's own replica.
    #[must_use]
    pub fn local() -> Self {
        Self(LOCAL_DEVICE_ID.to_string())
    }

    /// Whether this is the reserved local device id.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0 == LOCAL_DEVICE_ID
    }

    /// Returns the id text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a named store within a bundle.
///
/// Store ids are restricted to ASCII letters, digits, and underscores so
/// they can double as directory names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreId(String);

impl StoreId {
    /// Validates and creates a store id.
    pub fn new(id: impl Into<String>) -> KvResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(KvError::invalid_argument("store id must not be empty"));
        }
        if id.len() > MAX_STORE_ID_LENGTH {
            return Err(KvError::invalid_argument(format!(
                "store id is {} bytes, maximum is {MAX_STORE_ID_LENGTH}",
                id.len()
            )));
        }
        if !id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(KvError::invalid_argument(
                "store id may only contain letters, digits, and underscores",
            ));
        }
        Ok(Self(id))
    }

    /// Returns the id text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordering of committed batches within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Where a committed mutation originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Committed by a caller on this node.
    Local,
    /// Applied during synchronization from the named device.
    Remote(DeviceId),
}

/// Per-device result of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Reconciliation with the device completed.
    Success,
    /// The device's support labels do not intersect this store's labels.
    NotEligible,
    /// The device could not be reached.
    Unreachable,
    /// Reconciliation started but failed.
    Failed,
}

/// Completion report for one device, delivered with sync-complete events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// The device this outcome is for.
    pub device: DeviceId,
    /// What happened.
    pub status: SyncStatus,
}

impl SyncOutcome {
    /// Creates an outcome.
    pub fn new(device: DeviceId, status: SyncStatus) -> Self {
        Self { device, status }
    }
}
