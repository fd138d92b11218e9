//! Segmented store over an ordered byte map.
//!
//! ```text
//! <store>/
//! ├─ .rscontrol.prop
//! ├─ rsdb              # chunk 0 of every record
//! └─ rsdb.subordinate  # chunks 1..n, keyed "<key>&<n>"
//! ```

mod segments;
mod store;

pub use store::{SegmentedStore, PRIMARY_FILE, SUBORDINATE_FILE};
