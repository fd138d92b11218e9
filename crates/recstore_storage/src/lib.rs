//! # recstore storage
//!
//! Byte-level backends for recstore.
//!
//! This crate provides the lowest-level storage abstractions used by the
//! record stores in `recstore_core`. Backends are **opaque**: they never
//! interpret the bytes they hold.
//!
//! ## Backend families
//!
//! - [`StorageBackend`] - an append-only byte log addressed by offset
//!   - [`FileBackend`] - persistent, one OS file
//!   - [`InMemoryBackend`] - for tests and ephemeral use
//! - [`OrderedMap`] - a string-keyed, byte-valued map iterated in key order
//!   - [`RedbMap`] - persistent, one `redb` database file
//!   - [`MemoryMap`] - for tests and ephemeral use
//!
//! ## Example
//!
//! ```rust
//! use recstore_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod memory_map;
mod ordered;
mod redb_map;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use memory_map::MemoryMap;
pub use ordered::OrderedMap;
pub use redb_map::RedbMap;
