//! One file per record.
//!
//! ```text
//! <store>/
//! ├─ .rscontrol.prop
//! └─ theFiles/
//!    └─ <key>    # payload bytes, one file per record
//! ```

use crate::config::StoreConfig;
use crate::core::{file_size, StoreCore};
use crate::error::{buffer_with_capacity, CoreError, CoreResult};
use crate::properties::sync_directory;
use crate::store::{end_of_sequence, missing_key, RecordStore};
use crate::types::{Cursor, Mode, StoreKind};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory holding the record files.
pub const FILES_DIR: &str = "theFiles";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Start,
    After(String),
    Before(String),
}

/// A record store keeping every record in its own file, named by its key.
///
/// Besides the usual key rules, a key may not be `.` or `..` and may not
/// contain a NUL byte. Records sequence in key order. The key set is read
/// from the directory when the store is opened.
#[derive(Debug)]
pub struct FileStore {
    core: StoreCore,
    keys: BTreeSet<String>,
    position: Position,
}

impl FileStore {
    /// Creates an empty file store.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists.
    pub fn create(path: &Path, description: &str) -> CoreResult<Self> {
        Self::create_with_config(path, description, &StoreConfig::default())
    }

    /// Creates an empty file store with an explicit config.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists.
    pub fn create_with_config(
        path: &Path,
        description: &str,
        config: &StoreConfig,
    ) -> CoreResult<Self> {
        let core = StoreCore::create(path, description, StoreKind::File, config)?;
        if let Err(e) = fs::create_dir(path.join(FILES_DIR)) {
            if let Err(cleanup) = fs::remove_dir_all(path) {
                warn!("Cannot remove half-created store {:?}: {}", path, cleanup);
            }
            return Err(e.into());
        }
        Ok(Self {
            core,
            keys: BTreeSet::new(),
            position: Position::Start,
        })
    }

    /// Opens an existing file store.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for a missing store, or a strategy
    /// error if the control file or record directory is unusable.
    pub fn open(path: &Path, mode: Mode) -> CoreResult<Self> {
        Self::open_with_config(path, mode, &StoreConfig::default())
    }

    /// Opens an existing file store with an explicit config.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with_config(path: &Path, mode: Mode, config: &StoreConfig) -> CoreResult<Self> {
        let mut core = StoreCore::open(path, mode, config)?;
        if core.kind() != StoreKind::File {
            return Err(CoreError::strategy(format!(
                "{} is a {} store, not File",
                path.display(),
                core.kind()
            )));
        }
        let keys = scan_keys(&path.join(FILES_DIR))?;

        let found = keys.len() as u64;
        if found != core.count() {
            warn!(
                "Count of {:?} is {} but {} record files exist",
                path,
                core.count(),
                found
            );
            if mode == Mode::ReadWrite {
                core.reset_count(found)?;
            }
        }

        Ok(Self {
            core,
            keys,
            position: Position::Start,
        })
    }

    fn files_dir(&self) -> PathBuf {
        self.core.path().join(FILES_DIR)
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.files_dir().join(key)
    }

    fn check_present(&self, key: &str) -> CoreResult<PathBuf> {
        if !self.keys.contains(key) {
            return Err(missing_key(key));
        }
        Ok(self.record_path(key))
    }
}

impl RecordStore for FileStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StoreCore {
        &mut self.core
    }

    fn space_used(&self) -> CoreResult<u64> {
        let mut total = self.core.space_used()?;
        for key in &self.keys {
            total += file_size(&self.record_path(key))?;
        }
        Ok(total)
    }

    fn sync(&mut self) -> CoreResult<()> {
        if self.core.mode().is_read_only() {
            return Ok(());
        }
        for key in &self.keys {
            open_for_sync(&self.record_path(key), key)?.sync_all()?;
        }
        sync_directory(&self.files_dir())?;
        self.core.sync()
    }

    fn insert(&mut self, key: &str, data: &[u8]) -> CoreResult<()> {
        self.core.ensure_writable()?;
        validate_file_key(key)?;
        if self.keys.contains(key) {
            return Err(CoreError::object_exists(key));
        }

        let path = self.record_path(key);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(CoreError::object_exists(key));
            }
            Err(e) => return Err(e.into()),
        };
        let durable = self.core.config().sync_on_write;
        let written = file
            .write_all(data)
            .and_then(|()| if durable { file.sync_all() } else { Ok(()) });
        if let Err(e) = written {
            drop(file);
            if let Err(undo) = fs::remove_file(&path) {
                warn!("Cannot remove partial record file {:?}: {}", path, undo);
            }
            return Err(e.into());
        }

        self.keys.insert(key.to_owned());
        self.core.record_insert()
    }

    fn remove(&mut self, key: &str) -> CoreResult<()> {
        self.core.ensure_writable()?;
        let path = self.check_present(key)?;
        fs::remove_file(&path).map_err(|e| record_error(key, e))?;
        self.keys.remove(key);
        self.core.record_remove()
    }

    fn read(&self, key: &str) -> CoreResult<Vec<u8>> {
        let path = self.check_present(key)?;
        let mut file = File::open(&path).map_err(|e| record_error(key, e))?;
        let mut data = buffer_with_capacity(file.metadata()?.len())?;
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn length(&self, key: &str) -> CoreResult<u64> {
        let path = self.check_present(key)?;
        let meta = fs::metadata(&path).map_err(|e| record_error(key, e))?;
        Ok(meta.len())
    }

    fn flush(&mut self, key: &str) -> CoreResult<()> {
        self.core.ensure_writable()?;
        let path = self.check_present(key)?;
        open_for_sync(&path, key)?.sync_all()?;
        Ok(())
    }

    fn sequence_key(&mut self, cursor: Cursor) -> CoreResult<String> {
        let next = match (cursor, &self.position) {
            (Cursor::Start, _) | (_, Position::Start) => self.keys.iter().next(),
            (Cursor::Next, Position::After(key)) => self
                .keys
                .range::<str, _>((Bound::Excluded(key.as_str()), Bound::Unbounded))
                .next(),
            (Cursor::Next, Position::Before(key)) => self
                .keys
                .range::<str, _>((Bound::Included(key.as_str()), Bound::Unbounded))
                .next(),
        }
        .cloned();
        let key = next.ok_or_else(end_of_sequence)?;
        self.position = Position::After(key.clone());
        Ok(key)
    }

    fn set_cursor_at_key(&mut self, key: &str) -> CoreResult<()> {
        self.check_present(key)?;
        self.position = Position::Before(key.to_owned());
        Ok(())
    }

    fn move_to(&mut self, new_path: &Path) -> CoreResult<()> {
        self.core.move_to(new_path)
    }
}

fn validate_file_key(key: &str) -> CoreResult<()> {
    StoreCore::validate_key(key)?;
    if matches!(key, "." | "..") || key.contains('\0') {
        return Err(CoreError::parameter(format!(
            "key {key:?} cannot name a record file"
        )));
    }
    Ok(())
}

/// Maps a missing record file onto `ObjectDoesNotExist`.
fn record_error(key: &str, err: io::Error) -> CoreError {
    if err.kind() == io::ErrorKind::NotFound {
        missing_key(key)
    } else {
        err.into()
    }
}

fn open_for_sync(path: &Path, key: &str) -> CoreResult<File> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| record_error(key, e))
}

fn scan_keys(dir: &Path) -> CoreResult<BTreeSet<String>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        CoreError::strategy(format!("cannot list records in {}: {e}", dir.display()))
    })?;
    let mut keys = BTreeSet::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(key) => {
                keys.insert(key);
            }
            Err(name) => warn!("Skipping record file {:?} in {:?}", name, dir),
        }
    }
    info!("Found {} record files in {:?}", keys.len(), dir);
    Ok(keys)
}
