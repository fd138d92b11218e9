//! Append-only archive store.
//!
//! ```text
//! <store>/
//! ├─ .rscontrol.prop
//! ├─ archive     # payload bytes, appended
//! └─ manifest    # "<key> <size> <offset>" per line, appended
//! ```

mod log;
mod manifest;
mod store;

pub use log::ArchiveLog;
pub use manifest::{ManifestEntry, REMOVED};
pub use store::{ArchiveStore, ARCHIVE_FILE, MANIFEST_FILE};
