//! Directory-backed archive store and vacuum.

use super::log::ArchiveLog;
use crate::config::StoreConfig;
use crate::core::{file_size, StoreCore};
use crate::error::{CoreError, CoreResult};
use crate::properties::sync_directory;
use crate::store::{end_of_sequence, missing_key, RecordStore};
use crate::types::{Cursor, Mode, StoreKind};
use recstore_storage::{FileBackend, StorageBackend};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Blob log file name.
pub const ARCHIVE_FILE: &str = "archive";
/// Manifest file name.
pub const MANIFEST_FILE: &str = "manifest";

/// An append-only archive of records.
///
/// Removal only appends a tombstone, so space is reclaimed by
/// [`vacuum`](Self::vacuum), which rebuilds the store beside the original
/// and swaps the directories.
#[derive(Debug)]
pub struct ArchiveStore {
    core: StoreCore,
    log: Option<ArchiveLog>,
    /// Next sequencing position; `None` before the first `sequence` call.
    next: Option<usize>,
}

impl ArchiveStore {
    /// Creates an empty archive store at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists.
    pub fn create(path: &Path, description: &str) -> CoreResult<Self> {
        Self::create_with_config(path, description, &StoreConfig::default())
    }

    /// Creates an empty archive store with an explicit config.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists.
    pub fn create_with_config(
        path: &Path,
        description: &str,
        config: &StoreConfig,
    ) -> CoreResult<Self> {
        let core = StoreCore::create(path, description, StoreKind::Archive, config)?;
        let log = open_log(path, Mode::ReadWrite)?;
        Ok(Self {
            core,
            log: Some(log),
            next: None,
        })
    }

    /// Opens an existing archive store.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for a missing store, or a strategy
    /// error for a corrupt control file or manifest.
    pub fn open(path: &Path, mode: Mode) -> CoreResult<Self> {
        Self::open_with_config(path, mode, &StoreConfig::default())
    }

    /// Opens an existing archive store with an explicit config.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with_config(path: &Path, mode: Mode, config: &StoreConfig) -> CoreResult<Self> {
        let mut core = StoreCore::open(path, mode, config)?;
        if core.kind() != StoreKind::Archive {
            return Err(CoreError::strategy(format!(
                "{} is a {} store, not Archive",
                path.display(),
                core.kind()
            )));
        }
        let log = open_log(path, mode)?;

        if log.live_count() != core.count() {
            warn!(
                "Count of {:?} is {} but the manifest holds {} live keys",
                path,
                core.count(),
                log.live_count()
            );
            if mode == Mode::ReadWrite {
                core.reset_count(log.live_count())?;
            }
        }

        Ok(Self {
            core,
            log: Some(log),
            next: None,
        })
    }

    /// Reports whether the store at `path` holds reclaimable space.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn needs_vacuum_at(path: &Path) -> CoreResult<bool> {
        Ok(Self::open(path, Mode::ReadOnly)?.needs_vacuum())
    }

    /// Returns true if the manifest holds tombstones or superseded entries.
    #[must_use]
    pub fn needs_vacuum(&self) -> bool {
        self.log.as_ref().is_some_and(ArchiveLog::needs_vacuum)
    }

    /// Rebuilds the closed store at `path`, keeping only live records.
    ///
    /// # Errors
    ///
    /// Returns a strategy error if the store cannot be read, the
    /// replacement cannot be written, or the directories cannot be swapped.
    pub fn vacuum_at(path: &Path) -> CoreResult<()> {
        rebuild(path, &StoreConfig::default())
    }

    /// Rebuilds this store in place and reopens it.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on a read-only store or if the rebuild
    /// fails. If reopening fails afterwards, further calls on this handle
    /// fail too.
    pub fn vacuum(&mut self) -> CoreResult<()> {
        self.core.ensure_writable()?;
        self.sync()?;

        let path = self.core.path().to_path_buf();
        let config = self.core.config().clone();
        self.log = None;

        let rebuilt = rebuild(&path, &config);
        *self = Self::open_with_config(&path, Mode::ReadWrite, &config)?;
        rebuilt
    }

    fn log(&self) -> CoreResult<&ArchiveLog> {
        self.log.as_ref().ok_or_else(closed)
    }

    fn log_mut(&mut self) -> CoreResult<&mut ArchiveLog> {
        self.log.as_mut().ok_or_else(closed)
    }

    fn after_write(&mut self) -> CoreResult<()> {
        if self.core.config().sync_on_write {
            self.log_mut()?.sync()?;
        }
        Ok(())
    }
}

impl RecordStore for ArchiveStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StoreCore {
        &mut self.core
    }

    fn space_used(&self) -> CoreResult<u64> {
        let (blob, manifest) = self.log()?.sizes()?;
        Ok(self.core.space_used()? + blob + manifest)
    }

    fn sync(&mut self) -> CoreResult<()> {
        if self.core.mode().is_read_only() {
            return Ok(());
        }
        self.log_mut()?.sync()?;
        self.core.sync()
    }

    fn insert(&mut self, key: &str, data: &[u8]) -> CoreResult<()> {
        self.core.ensure_writable()?;
        StoreCore::validate_key(key)?;
        self.log_mut()?.append(key, data)?;
        self.after_write()?;
        self.core.record_insert()
    }

    fn remove(&mut self, key: &str) -> CoreResult<()> {
        self.core.ensure_writable()?;
        self.log_mut()?.tombstone(key)?;
        self.after_write()?;
        self.core.record_remove()
    }

    fn read(&self, key: &str) -> CoreResult<Vec<u8>> {
        self.log()?.read(key)
    }

    fn length(&self, key: &str) -> CoreResult<u64> {
        self.log()?.length(key)
    }

    fn flush(&mut self, key: &str) -> CoreResult<()> {
        self.core.ensure_writable()?;
        let log = self.log_mut()?;
        if !log.contains(key) {
            return Err(missing_key(key));
        }
        log.flush()
    }

    fn sequence_key(&mut self, cursor: Cursor) -> CoreResult<String> {
        let from = match (cursor, self.next) {
            (Cursor::Start, _) | (_, None) => 0,
            (Cursor::Next, Some(position)) => position,
        };
        let (position, key) = self.log()?.live_key_from(from).ok_or_else(end_of_sequence)?;
        let key = key.to_owned();
        self.next = Some(position + 1);
        Ok(key)
    }

    fn set_cursor_at_key(&mut self, key: &str) -> CoreResult<()> {
        let position = self.log()?.position_of(key).ok_or_else(|| missing_key(key))?;
        self.next = Some(position);
        Ok(())
    }

    fn move_to(&mut self, new_path: &Path) -> CoreResult<()> {
        self.core.ensure_writable()?;
        if new_path.exists() {
            return Err(CoreError::object_exists(new_path.display().to_string()));
        }
        self.sync()?;
        self.log = None;
        let moved = self.core.move_to(new_path);
        self.log = Some(open_log(self.core.path(), Mode::ReadWrite)?);
        moved
    }
}

fn open_log(dir: &Path, mode: Mode) -> CoreResult<ArchiveLog> {
    let (blob, manifest): (Box<dyn StorageBackend>, Box<dyn StorageBackend>) = match mode {
        Mode::ReadWrite => (
            Box::new(FileBackend::open(&dir.join(ARCHIVE_FILE))?),
            Box::new(FileBackend::open(&dir.join(MANIFEST_FILE))?),
        ),
        Mode::ReadOnly => (
            Box::new(FileBackend::open_read_only(&dir.join(ARCHIVE_FILE))?),
            Box::new(FileBackend::open_read_only(&dir.join(MANIFEST_FILE))?),
        ),
    };
    ArchiveLog::load(blob, manifest, mode == Mode::ReadWrite)
}

fn closed() -> CoreError {
    CoreError::strategy("archive files are closed")
}

/// Copies every live record of the store at `path` into a fresh sibling
/// store, then swaps the two directories.
fn rebuild(path: &Path, config: &StoreConfig) -> CoreResult<()> {
    let name = path
        .file_name()
        .ok_or_else(|| CoreError::parameter(format!("{} has no file name", path.display())))?
        .to_string_lossy()
        .into_owned();
    let tag = Uuid::new_v4();
    let staging = path.with_file_name(format!("{name}.vacuum-{tag}"));
    let retired = path.with_file_name(format!("{name}.retired-{tag}"));

    let source = ArchiveStore::open_with_config(path, Mode::ReadOnly, config)?;
    let before = source.space_used()?;
    info!("Vacuuming {:?} ({} bytes)", path, before);

    if let Err(e) = copy_live(&source, &staging, config) {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            warn!("Cannot remove vacuum staging {:?}: {}", staging, cleanup);
        }
        return Err(e);
    }
    drop(source);

    fs::rename(path, &retired)?;
    if let Err(e) = fs::rename(&staging, path) {
        warn!("Restoring {:?} after failed swap: {}", path, e);
        fs::rename(&retired, path)?;
        return Err(e.into());
    }
    sync_directory(&parent_dir(path))?;
    fs::remove_dir_all(&retired)?;

    let after = dir_space(path)?;
    info!("Vacuumed {:?}: {} -> {} bytes", path, before, after);
    Ok(())
}

fn copy_live(source: &ArchiveStore, staging: &Path, config: &StoreConfig) -> CoreResult<()> {
    let mut replacement =
        ArchiveStore::create_with_config(staging, source.description(), config)?;
    replacement.core.set_properties(&source.properties())?;
    let log = source.log()?;
    for key in log.live_keys() {
        let data = log.read(key)?;
        replacement.insert(key, &data)?;
    }
    replacement.sync()
}

fn dir_space(path: &Path) -> CoreResult<u64> {
    Ok(file_size(&path.join(crate::core::CONTROL_FILE))?
        + file_size(&path.join(ARCHIVE_FILE))?
        + file_size(&path.join(MANIFEST_FILE))?)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Records;
    use tempfile::tempdir;

    fn populated(path: &Path, keys: &[&str]) -> ArchiveStore {
        let mut store = ArchiveStore::create(path, "Archive under test").unwrap();
        for key in keys {
            store.insert(key, format!("data for {key}").as_bytes()).unwrap();
        }
        store
    }

    #[test]
    fn insert_read_length() {
        let dir = tempdir().unwrap();
        let store = populated(&dir.path().join("ar"), &["key1", "key2"]);

        assert_eq!(store.read("key2").unwrap(), b"data for key2");
        assert_eq!(store.length("key1").unwrap(), 13);
        assert_eq!(store.count(), 2);
        assert!(store.read("key3").unwrap_err().is_not_found());
        assert!(store.contains_key("key1").unwrap());
        assert!(!store.contains_key("key3").unwrap());
    }

    #[test]
    fn duplicate_insert_changes_nothing() {
        let dir = tempdir().unwrap();
        let mut store = populated(&dir.path().join("ar"), &["key1"]);
        let used = store.space_used().unwrap();

        assert!(store.insert("key1", b"other").unwrap_err().is_exists());
        assert_eq!(store.count(), 1);
        assert_eq!(store.read("key1").unwrap(), b"data for key1");
        assert_eq!(store.space_used().unwrap(), used);
    }

    #[test]
    fn invalid_key_is_parameter_error() {
        let dir = tempdir().unwrap();
        let mut store = populated(&dir.path().join("ar"), &[]);
        assert!(store.insert("a/b", b"x").unwrap_err().is_parameter());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn remove_then_reinsert() {
        let dir = tempdir().unwrap();
        let mut store = populated(&dir.path().join("ar"), &["key1", "key2"]);

        store.remove("key1").unwrap();
        assert!(store.read("key1").unwrap_err().is_not_found());
        assert!(store.remove("key1").unwrap_err().is_not_found());
        assert_eq!(store.count(), 1);
        assert!(store.needs_vacuum());

        store.insert("key1", b"back").unwrap();
        assert_eq!(store.read("key1").unwrap(), b"back");
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn replace_requires_existing_key() {
        let dir = tempdir().unwrap();
        let mut store = populated(&dir.path().join("ar"), &["key1"]);
        store.replace("key1", b"new").unwrap();
        assert_eq!(store.read("key1").unwrap(), b"new");
        assert!(store.replace("nope", b"x").unwrap_err().is_not_found());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ar");
        {
            let mut store = populated(&path, &["key1", "key2", "key3"]);
            store.remove("key2").unwrap();
        }
        let store = ArchiveStore::open(&path, Mode::ReadOnly).unwrap();
        assert_eq!(store.count(), 2);
        assert_eq!(store.read("key3").unwrap(), b"data for key3");
        assert!(store.needs_vacuum());
        assert!(ArchiveStore::needs_vacuum_at(&path).unwrap());
    }

    #[test]
    fn sequence_in_insertion_order() {
        let dir = tempdir().unwrap();
        let mut store = populated(&dir.path().join("ar"), &["zeta", "alpha", "mid"]);
        store.remove("alpha").unwrap();

        let keys: Vec<String> = Records::new(&mut store)
            .map(|r| r.unwrap().key)
            .collect();
        assert_eq!(keys, ["zeta", "mid"]);

        assert!(store.sequence_key(Cursor::Next).unwrap_err().is_not_found());
        assert_eq!(store.sequence(Cursor::Start).unwrap().key, "zeta");
    }

    #[test]
    fn first_sequence_starts_from_beginning() {
        let dir = tempdir().unwrap();
        let mut store = populated(&dir.path().join("ar"), &["key1", "key2"]);
        assert_eq!(store.sequence_key(Cursor::Next).unwrap(), "key1");
        assert_eq!(store.sequence_key(Cursor::Next).unwrap(), "key2");
    }

    #[test]
    fn cursor_survives_removal_of_its_key() {
        let dir = tempdir().unwrap();
        let mut store = populated(&dir.path().join("ar"), &["key1", "key2", "key3", "key4"]);

        store.set_cursor_at_key("key3").unwrap();
        store.remove("key3").unwrap();
        assert_eq!(store.sequence_key(Cursor::Next).unwrap(), "key4");

        assert!(store.set_cursor_at_key("key3").unwrap_err().is_not_found());
    }

    #[test]
    fn vacuum_reclaims_space() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ar");
        let mut store = populated(&path, &["key1", "key2", "key3", "key4"]);
        let mut props = crate::Properties::new();
        props.set("Owner", "lab").unwrap();
        store.set_properties(&props).unwrap();
        store.remove("key1").unwrap();
        store.remove("key3").unwrap();
        let before = store.space_used().unwrap();

        store.vacuum().unwrap();

        assert_eq!(store.count(), 2);
        assert!(!store.needs_vacuum());
        assert!(store.space_used().unwrap() <= before);
        assert_eq!(store.read("key2").unwrap(), b"data for key2");
        assert_eq!(store.read("key4").unwrap(), b"data for key4");
        assert_eq!(store.description(), "Archive under test");
        assert_eq!(store.properties().get("Owner"), Some("lab"));

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn vacuum_at_closed_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ar");
        {
            let mut store = populated(&path, &["a", "b"]);
            store.remove("a").unwrap();
        }
        ArchiveStore::vacuum_at(&path).unwrap();
        assert!(!ArchiveStore::needs_vacuum_at(&path).unwrap());
        let manifest = fs::read_to_string(path.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest, "b 10 0\n");
    }

    #[test]
    fn read_only_rejects_every_mutator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ar");
        drop(populated(&path, &["key1"]));
        let snapshot = |p: &Path| {
            [ARCHIVE_FILE, MANIFEST_FILE, crate::core::CONTROL_FILE]
                .map(|f| fs::read(p.join(f)).unwrap())
        };
        let before = snapshot(&path);

        let mut store = ArchiveStore::open(&path, Mode::ReadOnly).unwrap();
        assert!(store.insert("key2", b"x").unwrap_err().is_strategy());
        assert!(store.remove("key1").unwrap_err().is_strategy());
        assert!(store.replace("key1", b"x").unwrap_err().is_strategy());
        assert!(store.flush("key1").unwrap_err().is_strategy());
        assert!(store.change_description("x").unwrap_err().is_strategy());
        assert!(store.vacuum().unwrap_err().is_strategy());
        assert!(store.move_to(&dir.path().join("elsewhere")).unwrap_err().is_strategy());
        assert!(store.sync().is_ok());
        assert_eq!(snapshot(&path), before);
    }

    #[test]
    fn move_keeps_records() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        let mut store = populated(&old, &["key1"]);

        store.move_to(&new).unwrap();
        assert!(!old.exists());
        assert_eq!(store.path(), new);
        store.insert("key2", b"after move").unwrap();
        assert_eq!(store.read("key1").unwrap(), b"data for key1");
        drop(store);

        let store = ArchiveStore::open(&new, Mode::ReadOnly).unwrap();
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn open_wrong_kind_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");
        drop(
            StoreCore::create(&path, "x", StoreKind::Segmented, &StoreConfig::default())
                .unwrap(),
        );
        assert!(ArchiveStore::open(&path, Mode::ReadOnly).unwrap_err().is_strategy());
    }
}
