//! # recstore core
//!
//! Record stores: persistent maps from string keys to byte payloads.
//!
//! Every store is a directory holding a `.rscontrol.prop` control file
//! (`Description`, `Count`, `Type` and any caller properties) next to the
//! backend's own files. The backend is picked from `Type` when a store is
//! opened through [`open_record_store`].
//!
//! ## Backends
//!
//! - [`ArchiveStore`] - append-only payload log plus a text manifest, with
//!   tombstones reclaimed by [`ArchiveStore::vacuum`]
//! - [`SegmentedStore`] - two `redb` maps; records over
//!   [`StoreConfig::max_record_size`] are split into chunks
//! - [`CompressedStore`] - zstd payloads in one inner store, uncompressed
//!   lengths in another
//! - [`FileStore`] - one file per record, named by its key
//! - [`ListStore`] - a read-only key list projected over a source store
//!
//! [`StoreUnion`] and [`PersistentStoreUnion`] fan reads and writes out
//! across several named stores.
//!
//! ## Example
//!
//! ```rust
//! use recstore_core::{create_record_store, Cursor, RecordStore, StoreKind};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut store = create_record_store(&dir.path().join("db"), "demo", StoreKind::Archive).unwrap();
//! store.insert("greeting", b"hello").unwrap();
//! assert_eq!(store.read("greeting").unwrap(), b"hello");
//! assert_eq!(store.sequence_key(Cursor::Start).unwrap(), "greeting");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod compressed;
mod config;
mod core;
mod error;
mod factory;
mod file;
mod list;
mod properties;
pub mod segmented;
mod store;
mod types;
pub mod union;

pub use archive::ArchiveStore;
pub use compressed::{CompressedStore, Compressor, CompressorKind};
pub use config::StoreConfig;
pub use self::core::{
    StoreCore, CONTROL_FILE, CORE_PROPERTIES, COUNT_PROPERTY, DESCRIPTION_PROPERTY,
    INVALID_KEY_CHARS, KEY_SEGMENT_SEPARATOR, TYPE_PROPERTY,
};
pub use error::{CoreError, CoreResult};
pub use file::{FileStore, FILES_DIR};
pub use factory::{
    create_record_store, create_record_store_with_config, merge_record_stores,
    merge_record_stores_with_config, open_record_store, open_record_store_with_config,
    remove_record_store,
};
pub use list::{ListStore, KEY_LIST_FILE, SOURCE_PROPERTY};
pub use properties::Properties;
pub use segmented::SegmentedStore;
pub use store::{RecordStore, Records};
pub use types::{Cursor, Mode, Record, StoreKind};
pub use union::{shared, PersistentStoreUnion, SharedStore, StoreUnion, Union};
