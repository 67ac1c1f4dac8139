//! # synckv Storage
//!
//! Append-only byte-store backends for synckv store logs.
//!
//! Backends are opaque: they move bytes and guarantee durability, while
//! the engine owns record framing, checksums, and replay. Two
//! implementations are provided:
//!
//! - [`InMemoryBackend`] for ephemeral stores and tests
//! - [`FileBackend`] for persistent stores
//!
//! ## Example
//!
//! ```
//! use synckv_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! assert_eq!(backend.read_at(offset, 11).unwrap(), b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
