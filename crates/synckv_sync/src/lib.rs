//! # synckv Sync
//!
//! Device-to-device reconciliation for synckv stores.
//!
//! The [`SyncCoordinator`] drives push/pull passes for one open store
//! over a pluggable [`SyncTransport`]. Per-device results never fail a
//! pass: they are reported as [`synckv_core::SyncOutcome`]s and
//! delivered as one sync-complete event through the store's
//! notification hub.
//!
//! ## Model
//!
//! - Each store keeps an oplog of its committed local mutations
//! - Pulling fetches a peer's operations after a per-device cursor and
//!   applies them as one atomic, remote-filtered batch
//! - Pushing delivers unacknowledged local operations and advances the
//!   peer's acknowledgement cursor
//! - Label ranges ([`synckv_core::KvStore::set_sync_range`]) gate which
//!   peers are eligible at all

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod coordinator;
mod error;
mod transport;

pub use coordinator::{SyncCoordinator, SyncMode, DEFAULT_SYNC_TIMEOUT_MS};
pub use error::{SyncError, SyncResult};
pub use transport::{LoopbackTransport, MockTransport, SyncTransport};
