//! The record store interface.

use crate::core::StoreCore;
use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;
use crate::types::{Cursor, Mode, Record, StoreKind};
use std::path::Path;

/// A persistent map from string keys to byte payloads.
///
/// Every backend is one concrete type implementing this trait; the
/// factory functions pick the type from the stored `Type` property.
///
/// Mutators fail with a strategy error on a read-only store before any
/// I/O is attempted. Lookups of absent keys fail with
/// `ObjectDoesNotExist`, and so does a `sequence` call past the last
/// record.
pub trait RecordStore: Send + std::fmt::Debug {
    /// Returns the shared control-file state.
    fn core(&self) -> &StoreCore;

    /// Returns the shared control-file state mutably.
    fn core_mut(&mut self) -> &mut StoreCore;

    /// Returns the backend kind.
    fn kind(&self) -> StoreKind {
        self.core().kind()
    }

    /// Returns the store directory.
    fn path(&self) -> &Path {
        self.core().path()
    }

    /// Returns the access mode.
    fn mode(&self) -> Mode {
        self.core().mode()
    }

    /// Returns the description.
    fn description(&self) -> &str {
        self.core().description()
    }

    /// Replaces the description.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on a read-only store.
    fn change_description(&mut self, description: &str) -> CoreResult<()> {
        self.core_mut().change_description(description)
    }

    /// Returns the number of live records.
    fn count(&self) -> u64 {
        self.core().count()
    }

    /// Returns all non-core properties.
    fn properties(&self) -> Properties {
        self.core().properties()
    }

    /// Replaces the non-core properties.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on a read-only store.
    fn set_properties(&mut self, props: &Properties) -> CoreResult<()> {
        self.core_mut().set_properties(props)
    }

    /// Returns the bytes used on disk, control file included.
    ///
    /// # Errors
    ///
    /// Returns a strategy error if a file cannot be inspected.
    fn space_used(&self) -> CoreResult<u64>;

    /// Makes every completed mutation durable. A no-op on read-only stores.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on I/O failure.
    fn sync(&mut self) -> CoreResult<()>;

    /// Stores `data` under a new `key`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` for a present key, a parameter error for a
    /// malformed key, or a strategy error on a read-only store.
    fn insert(&mut self, key: &str, data: &[u8]) -> CoreResult<()>;

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for an absent key.
    fn remove(&mut self, key: &str) -> CoreResult<()>;

    /// Returns the payload of `key`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for an absent key.
    fn read(&self, key: &str) -> CoreResult<Vec<u8>>;

    /// Returns the payload length of `key` without reading the payload.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for an absent key.
    fn length(&self, key: &str) -> CoreResult<u64>;

    /// Replaces the payload of an existing `key`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for an absent key.
    fn replace(&mut self, key: &str, data: &[u8]) -> CoreResult<()> {
        self.remove(key)?;
        self.insert(key, data)
    }

    /// Returns true if `key` is present.
    ///
    /// # Errors
    ///
    /// Returns any failure of [`length`](Self::length) other than not-found.
    fn contains_key(&self, key: &str) -> CoreResult<bool> {
        match self.length(key) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Pushes any buffered bytes of `key` to the operating system.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for an absent key.
    fn flush(&mut self, key: &str) -> CoreResult<()>;

    /// Returns the next key in store order.
    ///
    /// [`Cursor::Start`] restarts from the first key. The first call on a
    /// fresh handle starts from the first key whatever the cursor.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` once every key has been returned.
    fn sequence_key(&mut self, cursor: Cursor) -> CoreResult<String>;

    /// Returns the next record in store order.
    ///
    /// # Errors
    ///
    /// Same as [`sequence_key`](Self::sequence_key).
    fn sequence(&mut self, cursor: Cursor) -> CoreResult<Record> {
        let key = self.sequence_key(cursor)?;
        let data = self.read(&key)?;
        Ok(Record { key, data })
    }

    /// Positions the cursor so the next `sequence(Next)` returns `key`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for an absent key.
    fn set_cursor_at_key(&mut self, key: &str) -> CoreResult<()>;

    /// Moves the store directory to `new_path`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `new_path` exists, or a strategy error on
    /// a read-only store.
    fn move_to(&mut self, new_path: &Path) -> CoreResult<()>;
}

/// Iterates over a store from its first record.
///
/// Yields `Err` once for a failure other than end-of-sequence, then stops.
pub struct Records<'a> {
    store: &'a mut dyn RecordStore,
    cursor: Cursor,
    done: bool,
}

impl<'a> Records<'a> {
    /// Starts iterating `store` from its first record.
    pub fn new(store: &'a mut dyn RecordStore) -> Self {
        Self {
            store,
            cursor: Cursor::Start,
            done: false,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = CoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.store.sequence(self.cursor);
        self.cursor = Cursor::Next;
        match result {
            Ok(record) => Some(Ok(record)),
            Err(e) if e.is_not_found() => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Returns an error for a missing key, shared by the backends.
pub(crate) fn missing_key(key: &str) -> CoreError {
    CoreError::not_found(key)
}

/// Returns the error for an exhausted sequence.
pub(crate) fn end_of_sequence() -> CoreError {
    CoreError::not_found("no more records")
}
