//! Fan-out across named member stores.
//!
//! Every operation visits every member before reporting. A member that
//! lacks the key is left out of the result; any other member failure is
//! collected, and all collected failures are raised together as one
//! strategy error.

mod fanout;
mod persistent;

pub use fanout::StoreUnion;
pub use persistent::{PersistentStoreUnion, UNION_CONTROL_FILE};

use crate::error::CoreResult;
use crate::store::RecordStore;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A member store handle that the caller may keep a clone of.
pub type SharedStore = Arc<Mutex<Box<dyn RecordStore>>>;

/// Wraps an open store as a [`SharedStore`].
#[must_use]
pub fn shared(store: Box<dyn RecordStore>) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Operations over a set of named member stores.
pub trait Union {
    /// Returns the member names in construction order.
    fn names(&self) -> Vec<String>;

    /// Returns the member called `name`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for an unknown name.
    fn store(&self, name: &str) -> CoreResult<SharedStore>;

    /// Reads `key` from every member holding it.
    ///
    /// # Errors
    ///
    /// Returns a strategy error naming every failing member, or
    /// `ObjectDoesNotExist` if no member holds the key.
    fn read(&self, key: &str) -> CoreResult<BTreeMap<String, Vec<u8>>>;

    /// Returns the length of `key` in every member holding it.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read).
    fn length(&self, key: &str) -> CoreResult<BTreeMap<String, u64>>;

    /// Inserts one payload per member.
    ///
    /// # Errors
    ///
    /// Returns a parameter error if `data` has fewer entries than there
    /// are members, `ObjectDoesNotExist` for an unknown member name, or a
    /// strategy error naming every failing member.
    fn insert(&self, key: &str, data: &BTreeMap<String, Vec<u8>>) -> CoreResult<()>;

    /// Replaces one payload per member.
    ///
    /// # Errors
    ///
    /// Same as [`insert`](Self::insert).
    fn replace(&self, key: &str, data: &BTreeMap<String, Vec<u8>>) -> CoreResult<()>;

    /// Removes `key` from every member holding it.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` if no member held the key, or a
    /// strategy error naming every failing member.
    fn remove(&self, key: &str) -> CoreResult<()>;
}
