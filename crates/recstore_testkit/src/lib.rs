//! # recstore testkit
//!
//! Test utilities for recstore.
//!
//! This crate provides:
//! - Temporary store fixtures and populated scenarios
//! - Property-based test generators using proptest
//! - A crash-injecting storage backend
//!
//! ## Usage
//!
//! ```rust
//! use recstore_testkit::prelude::*;
//!
//! with_temp_store(StoreKind::Segmented, |store| {
//!     store.insert("key", b"value").unwrap();
//!     assert_eq!(store.count(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use recstore_core::{RecordStore, StoreKind};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
