//! `redb`-backed ordered map.

use crate::error::{StorageError, StorageResult};
use crate::ordered::OrderedMap;
use redb::{Database, ReadOnlyTable, ReadableTable, TableDefinition, TableError};
use std::fmt;
use std::ops::Bound;
use std::path::{Path, PathBuf};

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// An [`OrderedMap`] stored in a single `redb` database file.
///
/// Every mutation runs in its own immediately durable write transaction,
/// so a successful return means the bytes are on disk.
///
/// `redb` holds an exclusive lock on the file, so one database can be
/// open through at most one `RedbMap` at a time.
pub struct RedbMap {
    path: PathBuf,
    db: Database,
    read_only: bool,
}

impl fmt::Debug for RedbMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbMap")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl RedbMap {
    /// Creates a new map file, or opens it if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or is not a `redb`
    /// database.
    pub fn create(path: &Path) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let map = Self {
            path: path.to_path_buf(),
            db,
            read_only: false,
        };
        map.ensure_table()?;
        Ok(map)
    }

    /// Opens an existing map file.
    ///
    /// With `read_only` set, every mutation fails with
    /// [`StorageError::ReadOnly`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or is not a `redb` database.
    pub fn open(path: &Path, read_only: bool) -> StorageResult<Self> {
        let db = Database::open(path)?;
        let map = Self {
            path: path.to_path_buf(),
            db,
            read_only,
        };
        if !read_only {
            map.ensure_table()?;
        }
        Ok(map)
    }

    /// Returns the path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_table(&self) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        txn.open_table(RECORDS)?;
        txn.commit()?;
        Ok(())
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly(self.path.display().to_string()));
        }
        Ok(())
    }

    /// Runs `f` against the records table in a read transaction. A
    /// database without the table reads as empty.
    fn with_table<T>(
        &self,
        empty: T,
        f: impl FnOnce(&ReadOnlyTable<&'static str, &'static [u8]>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(RECORDS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(empty),
            Err(e) => return Err(e.into()),
        };
        f(&table)
    }

    fn first_in_range(&self, start: Bound<&str>) -> StorageResult<Option<String>> {
        self.with_table(None, |table| {
            let mut range = table.range::<&str>((start, Bound::Unbounded))?;
            match range.next() {
                Some(entry) => {
                    let (key, _) = entry?;
                    Ok(Some(key.value().to_owned()))
                }
                None => Ok(None),
            }
        })
    }
}

impl OrderedMap for RedbMap {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.with_table(None, |table| {
            Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
        })
    }

    fn value_len(&self, key: &str) -> StorageResult<Option<u64>> {
        self.with_table(None, |table| {
            Ok(table.get(key)?.map(|guard| guard.value().len() as u64))
        })
    }

    fn insert_new(&mut self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.check_writable()?;
        let txn = self.db.begin_write()?;
        let present = {
            let mut table = txn.open_table(RECORDS)?;
            let present = table.get(key)?.is_some();
            if !present {
                table.insert(key, value)?;
            }
            present
        };
        if present {
            txn.abort()?;
            return Err(StorageError::KeyExists(key.to_owned()));
        }
        txn.commit()?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<bool> {
        self.check_writable()?;
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(RECORDS)?;
            let guard = table.remove(key)?;
            guard.is_some()
        };
        if removed {
            txn.commit()?;
        } else {
            txn.abort()?;
        }
        Ok(removed)
    }

    fn first_key(&self) -> StorageResult<Option<String>> {
        self.first_in_range(Bound::Unbounded)
    }

    fn next_key_after(&self, key: &str) -> StorageResult<Option<String>> {
        self.first_in_range(Bound::Excluded(key))
    }

    fn seek_key(&self, key: &str) -> StorageResult<Option<String>> {
        self.first_in_range(Bound::Included(key))
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exclusive_insert_and_lookup() {
        let dir = tempdir().unwrap();
        let mut map = RedbMap::create(&dir.path().join("rsdb")).unwrap();

        map.insert_new("alpha", b"one").unwrap();
        assert_eq!(map.get("alpha").unwrap().unwrap(), b"one");
        assert_eq!(map.value_len("alpha").unwrap(), Some(3));
        assert!(map.get("beta").unwrap().is_none());

        let dup = map.insert_new("alpha", b"two");
        assert!(matches!(dup, Err(StorageError::KeyExists(k)) if k == "alpha"));
        assert_eq!(map.get("alpha").unwrap().unwrap(), b"one");
    }

    #[test]
    fn empty_values_are_present() {
        let dir = tempdir().unwrap();
        let mut map = RedbMap::create(&dir.path().join("rsdb")).unwrap();

        map.insert_new("empty", b"").unwrap();
        assert!(map.contains("empty").unwrap());
        assert_eq!(map.value_len("empty").unwrap(), Some(0));
    }

    #[test]
    fn key_order_navigation() {
        let dir = tempdir().unwrap();
        let mut map = RedbMap::create(&dir.path().join("rsdb")).unwrap();
        for key in ["c", "a", "b"] {
            map.insert_new(key, key.as_bytes()).unwrap();
        }

        assert_eq!(map.first_key().unwrap().as_deref(), Some("a"));
        assert_eq!(map.next_key_after("a").unwrap().as_deref(), Some("b"));
        assert_eq!(map.next_key_after("c").unwrap(), None);
        assert_eq!(map.seek_key("b").unwrap().as_deref(), Some("b"));
        assert_eq!(map.seek_key("bb").unwrap().as_deref(), Some("c"));
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempdir().unwrap();
        let mut map = RedbMap::create(&dir.path().join("rsdb")).unwrap();
        map.insert_new("k", b"v").unwrap();

        assert!(map.remove("k").unwrap());
        assert!(!map.remove("k").unwrap());
        assert_eq!(map.first_key().unwrap(), None);
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rsdb");
        {
            let mut map = RedbMap::create(&path).unwrap();
            map.insert_new("k", b"v").unwrap();
        }

        let mut map = RedbMap::open(&path, true).unwrap();
        assert_eq!(map.get("k").unwrap().unwrap(), b"v");
        assert!(matches!(map.insert_new("x", b"y"), Err(StorageError::ReadOnly(_))));
        assert!(matches!(map.remove("k"), Err(StorageError::ReadOnly(_))));
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(RedbMap::open(&dir.path().join("absent"), false).is_err());
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rsdb");
        {
            let mut map = RedbMap::create(&path).unwrap();
            map.insert_new("k", b"v").unwrap();
        }
        let map = RedbMap::open(&path, true).unwrap();
        assert_eq!(map.get("k").unwrap().unwrap(), b"v");
    }
}
