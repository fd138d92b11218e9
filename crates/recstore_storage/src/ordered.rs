//! Ordered byte map trait.

use crate::error::StorageResult;

/// A string-keyed, byte-valued map whose keys iterate in ascending order.
///
/// This is the engine under the segmented record store. Lookups return
/// `Option` so "not found" is never confused with an I/O failure, and
/// writes are exclusive: [`insert_new`](OrderedMap::insert_new) refuses
/// to overwrite.
///
/// Iteration is by key rather than by handle, so a caller can hold its
/// position as a plain `String` across mutations of the map.
pub trait OrderedMap: Send + Sync {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Returns the length of the value under `key` without copying it out.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be read.
    fn value_len(&self, key: &str) -> StorageResult<Option<u64>>;

    /// Returns true if `key` is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be read.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.value_len(key)?.is_some())
    }

    /// Stores `value` under `key`, failing if the key is already present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyExists`](crate::StorageError::KeyExists)
    /// if the key is present, [`StorageError::ReadOnly`](crate::StorageError::ReadOnly)
    /// on a read-only map, or an engine error.
    fn insert_new(&mut self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes `key`, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error on a read-only map or if the engine fails.
    fn remove(&mut self, key: &str) -> StorageResult<bool>;

    /// Returns the smallest key.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be read.
    fn first_key(&self) -> StorageResult<Option<String>>;

    /// Returns the smallest key strictly greater than `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be read.
    fn next_key_after(&self, key: &str) -> StorageResult<Option<String>>;

    /// Returns the smallest key greater than or equal to `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be read.
    fn seek_key(&self, key: &str) -> StorageResult<Option<String>>;

    /// Makes all committed writes durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot persist its state.
    fn sync(&mut self) -> StorageResult<()>;
}
