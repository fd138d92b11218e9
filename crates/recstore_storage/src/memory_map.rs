//! In-memory ordered map.

use crate::error::{StorageError, StorageResult};
use crate::ordered::OrderedMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// An [`OrderedMap`] over a shared `BTreeMap`.
///
/// Clones share the same entries, which lets tests observe what a store
/// wrote after the store itself is gone.
#[derive(Debug, Default, Clone)]
pub struct MemoryMap {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    read_only: bool,
}

impl MemoryMap {
    /// Creates an empty writable map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle over the same entries that rejects writes.
    #[must_use]
    pub fn read_only_view(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            read_only: true,
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns all keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly("memory map".to_owned()));
        }
        Ok(())
    }

    fn first_in_range(&self, start: Bound<&str>) -> Option<String> {
        self.entries
            .read()
            .range::<str, _>((start, Bound::Unbounded))
            .next()
            .map(|(key, _)| key.clone())
    }
}

impl OrderedMap for MemoryMap {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn value_len(&self, key: &str) -> StorageResult<Option<u64>> {
        Ok(self.entries.read().get(key).map(|v| v.len() as u64))
    }

    fn insert_new(&mut self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.check_writable()?;
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return Err(StorageError::KeyExists(key.to_owned()));
        }
        entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<bool> {
        self.check_writable()?;
        Ok(self.entries.write().remove(key).is_some())
    }

    fn first_key(&self) -> StorageResult<Option<String>> {
        Ok(self.first_in_range(Bound::Unbounded))
    }

    fn next_key_after(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.first_in_range(Bound::Excluded(key)))
    }

    fn seek_key(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.first_in_range(Bound::Included(key)))
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
