//! Read-only projections of another store.
//!
//! A list store holds a key list file and the path of a source store.
//! Sequencing walks the key list in file order; reads go to the source.

use crate::config::StoreConfig;
use crate::core::{file_size, StoreCore};
use crate::error::{CoreError, CoreResult};
use crate::factory::open_record_store_with_config;
use crate::properties::Properties;
use crate::store::{end_of_sequence, missing_key, RecordStore};
use crate::types::{Cursor, Mode, StoreKind};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::info;

/// Key list file name.
pub const KEY_LIST_FILE: &str = "KeyList.txt";
/// Property holding the absolute source store path.
pub const SOURCE_PROPERTY: &str = "Source Record Store";

/// A read-only view of selected keys of a source store.
pub struct ListStore {
    core: StoreCore,
    source: Box<dyn RecordStore>,
    keys: BufReader<File>,
}

impl std::fmt::Debug for ListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListStore")
            .field("core", &self.core)
            .field("source", &self.source.path())
            .finish_non_exhaustive()
    }
}

impl ListStore {
    /// Writes a list store at `path` over the store at `source_path`, then
    /// opens it.
    ///
    /// The source is opened read-only, so it must not be open read-write
    /// elsewhere in this process.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists, `ObjectDoesNotExist` if
    /// the source is missing, or a parameter error for a malformed key.
    pub fn create<I, K>(
        path: &Path,
        description: &str,
        source_path: &Path,
        keys: I,
    ) -> CoreResult<Self>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        Self::create_with_config(path, description, source_path, keys, &StoreConfig::default())
    }

    /// [`create`](Self::create) with an explicit config.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub fn create_with_config<I, K>(
        path: &Path,
        description: &str,
        source_path: &Path,
        keys: I,
        config: &StoreConfig,
    ) -> CoreResult<Self>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        if !source_path.exists() {
            return Err(CoreError::not_found(source_path.display().to_string()));
        }
        StoreCore::read_kind(source_path)?;
        let source = fs::canonicalize(source_path)?;
        let source = source.to_str().ok_or_else(|| {
            CoreError::parameter(format!("{} is not valid UTF-8", source.display()))
        })?;

        let keys: Vec<K> = keys.into_iter().collect();
        for key in &keys {
            StoreCore::validate_key(key.as_ref())?;
        }

        let mut core = StoreCore::create(path, description, StoreKind::List, config)?;
        core.reserve_property(SOURCE_PROPERTY);
        core.set_property(SOURCE_PROPERTY, source)?;

        let mut out = BufWriter::new(File::create(path.join(KEY_LIST_FILE))?);
        for key in &keys {
            writeln!(out, "{}", key.as_ref())?;
        }
        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        core.reset_count(keys.len() as u64)?;
        core.sync()?;
        info!("Created list store at {:?} over {}", path, source);
        drop(core);

        Self::open_with_config(path, Mode::ReadOnly, config)
    }

    /// Opens a list store. Only [`Mode::ReadOnly`] is accepted.
    ///
    /// # Errors
    ///
    /// Returns a strategy error for read-write mode, a missing key list,
    /// or an unusable source store.
    pub fn open(path: &Path, mode: Mode) -> CoreResult<Self> {
        Self::open_with_config(path, mode, &StoreConfig::default())
    }

    /// [`open`](Self::open) with an explicit config.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with_config(path: &Path, mode: Mode, config: &StoreConfig) -> CoreResult<Self> {
        if !mode.is_read_only() {
            return Err(CoreError::strategy(format!(
                "list store {} can only be opened read-only",
                path.display()
            )));
        }
        let mut core = StoreCore::open(path, Mode::ReadOnly, config)?;
        if core.kind() != StoreKind::List {
            return Err(CoreError::strategy(format!(
                "{} is a {} store, not List",
                path.display(),
                core.kind()
            )));
        }
        core.reserve_property(SOURCE_PROPERTY);
        let source_path = core
            .property(SOURCE_PROPERTY)
            .ok_or_else(|| {
                CoreError::strategy(format!("{} lacks {SOURCE_PROPERTY}", path.display()))
            })?
            .to_owned();
        let source =
            open_record_store_with_config(Path::new(&source_path), Mode::ReadOnly, config)?;
        let keys = File::open(path.join(KEY_LIST_FILE)).map_err(|e| {
            CoreError::strategy(format!("cannot open key list of {}: {e}", path.display()))
        })?;

        Ok(Self {
            core,
            source,
            keys: BufReader::new(keys),
        })
    }

    /// Returns the path of the source store.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        self.source.path()
    }

    /// Reads the next non-blank line, returning it with its byte length.
    fn next_line(&mut self) -> CoreResult<Option<(String, usize)>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.keys.read_line(&mut line)?;
            if read == 0 {
                return Ok(None);
            }
            let key = line.trim();
            if !key.is_empty() {
                return Ok(Some((key.to_owned(), read)));
            }
        }
    }

    fn reject_mutation(&self, operation: &str) -> CoreError {
        CoreError::strategy(format!(
            "cannot {operation}: list store {} is read-only",
            self.core.path().display()
        ))
    }
}

impl RecordStore for ListStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StoreCore {
        &mut self.core
    }

    fn change_description(&mut self, _description: &str) -> CoreResult<()> {
        Err(self.reject_mutation("change description"))
    }

    fn set_properties(&mut self, _props: &Properties) -> CoreResult<()> {
        Err(self.reject_mutation("set properties"))
    }

    fn space_used(&self) -> CoreResult<u64> {
        Ok(self.core.space_used()? + file_size(&self.core.path().join(KEY_LIST_FILE))?)
    }

    fn sync(&mut self) -> CoreResult<()> {
        Err(self.reject_mutation("sync"))
    }

    fn insert(&mut self, _key: &str, _data: &[u8]) -> CoreResult<()> {
        Err(self.reject_mutation("insert"))
    }

    fn remove(&mut self, _key: &str) -> CoreResult<()> {
        Err(self.reject_mutation("remove"))
    }

    fn replace(&mut self, _key: &str, _data: &[u8]) -> CoreResult<()> {
        Err(self.reject_mutation("replace"))
    }

    fn read(&self, key: &str) -> CoreResult<Vec<u8>> {
        self.source.read(key)
    }

    fn length(&self, key: &str) -> CoreResult<u64> {
        self.source.length(key)
    }

    fn flush(&mut self, _key: &str) -> CoreResult<()> {
        Err(self.reject_mutation("flush"))
    }

    fn sequence_key(&mut self, cursor: Cursor) -> CoreResult<String> {
        if cursor == Cursor::Start {
            self.keys.seek(SeekFrom::Start(0))?;
        }
        self.next_line()?
            .map(|(key, _)| key)
            .ok_or_else(end_of_sequence)
    }

    fn set_cursor_at_key(&mut self, key: &str) -> CoreResult<()> {
        self.keys.seek(SeekFrom::Start(0))?;
        while let Some((line, read)) = self.next_line()? {
            if line == key {
                let back = i64::try_from(read)
                    .map_err(|_| CoreError::strategy("key list line too long"))?;
                self.keys.seek_relative(-back)?;
                return Ok(());
            }
        }
        Err(missing_key(key))
    }

    fn move_to(&mut self, _new_path: &Path) -> CoreResult<()> {
        Err(self.reject_mutation("move"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveStore;
    use crate::store::Records;
    use tempfile::tempdir;

    fn source(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("source");
        let mut store = ArchiveStore::create(&path, "source").unwrap();
        for key in ["a", "b", "c", "d"] {
            store.insert(key, key.repeat(3).as_bytes()).unwrap();
        }
        path
    }

    #[test]
    fn sequence_follows_list_order() {
        let dir = tempdir().unwrap();
        let src = source(dir.path());
        let mut list =
            ListStore::create(&dir.path().join("list"), "picks", &src, ["c", "a"]).unwrap();

        assert_eq!(list.count(), 2);
        assert_eq!(list.mode(), Mode::ReadOnly);
        assert_eq!(list.kind(), StoreKind::List);
        let records: Vec<_> = Records::new(&mut list).map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "c");
        assert_eq!(records[0].data, b"ccc");
        assert_eq!(records[1].key, "a");
        assert_eq!(list.length("b").unwrap(), 3);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let src = source(dir.path());
        let path = dir.path().join("list");
        drop(ListStore::create(&path, "x", &src, ["b"]).unwrap());
        fs::write(path.join(KEY_LIST_FILE), "\n  \nb\n\nd\n").unwrap();

        let mut list = ListStore::open(&path, Mode::ReadOnly).unwrap();
        assert_eq!(list.sequence_key(Cursor::Start).unwrap(), "b");
        assert_eq!(list.sequence_key(Cursor::Next).unwrap(), "d");
        assert!(list.sequence_key(Cursor::Next).unwrap_err().is_not_found());
    }

    #[test]
    fn cursor_lands_on_key() {
        let dir = tempdir().unwrap();
        let src = source(dir.path());
        let mut list =
            ListStore::create(&dir.path().join("list"), "x", &src, ["d", "b", "a"]).unwrap();

        list.set_cursor_at_key("b").unwrap();
        assert_eq!(list.sequence_key(Cursor::Next).unwrap(), "b");
        assert_eq!(list.sequence_key(Cursor::Next).unwrap(), "a");
        assert!(list.set_cursor_at_key("zz").unwrap_err().is_not_found());
        assert_eq!(list.sequence_key(Cursor::Start).unwrap(), "d");
    }

    #[test]
    fn every_mutator_is_rejected() {
        let dir = tempdir().unwrap();
        let src = source(dir.path());
        let mut list = ListStore::create(&dir.path().join("list"), "x", &src, ["a"]).unwrap();

        assert!(list.insert("z", b"z").unwrap_err().is_strategy());
        assert!(list.remove("a").unwrap_err().is_strategy());
        assert!(list.replace("a", b"z").unwrap_err().is_strategy());
        assert!(list.flush("a").unwrap_err().is_strategy());
        assert!(list.sync().unwrap_err().is_strategy());
        assert!(list.change_description("y").unwrap_err().is_strategy());
        assert!(list.set_properties(&Properties::new()).unwrap_err().is_strategy());
        assert!(list.move_to(&dir.path().join("elsewhere")).unwrap_err().is_strategy());
        assert_eq!(list.read("a").unwrap(), b"aaa");
    }

    #[test]
    fn read_write_open_is_rejected() {
        let dir = tempdir().unwrap();
        let src = source(dir.path());
        let path = dir.path().join("list");
        drop(ListStore::create(&path, "x", &src, ["a"]).unwrap());
        assert!(ListStore::open(&path, Mode::ReadWrite).unwrap_err().is_strategy());
    }

    #[test]
    fn create_checks_source_and_keys() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nowhere");
        let err = ListStore::create(&dir.path().join("l1"), "x", &missing, ["a"]).unwrap_err();
        assert!(err.is_not_found());

        let src = source(dir.path());
        let err =
            ListStore::create(&dir.path().join("l2"), "x", &src, ["ok", "bad/key"]).unwrap_err();
        assert!(err.is_parameter());
        assert!(!dir.path().join("l2").exists());
    }

    #[test]
    fn source_path_is_absolute() {
        let dir = tempdir().unwrap();
        let src = source(dir.path());
        let list = ListStore::create(&dir.path().join("list"), "x", &src, ["a"]).unwrap();
        assert!(list.source_path().is_absolute());
        assert!(list.space_used().unwrap() > 0);
    }
}
