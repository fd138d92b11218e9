//! Segmented store over two `redb` maps.

use super::segments::SegmentMaps;
use crate::config::StoreConfig;
use crate::core::{file_size, StoreCore};
use crate::error::{CoreError, CoreResult};
use crate::store::{end_of_sequence, missing_key, RecordStore};
use crate::types::{Cursor, Mode, StoreKind};
use recstore_storage::{OrderedMap, RedbMap};
use std::path::Path;
use tracing::info;

/// Primary map file name.
pub const PRIMARY_FILE: &str = "rsdb";
/// Subordinate map file name.
pub const SUBORDINATE_FILE: &str = "rsdb.subordinate";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Start,
    After(String),
    Before(String),
}

/// A record store over an ordered byte map, splitting records larger than
/// [`StoreConfig::max_record_size`] into chunks.
///
/// Records sequence in key order. A store created before segmentation
/// existed has no subordinate map; opening it read-write adds one.
pub struct SegmentedStore {
    core: StoreCore,
    maps: Option<SegmentMaps>,
    position: Position,
}

impl std::fmt::Debug for SegmentedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentedStore")
            .field("core", &self.core)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl SegmentedStore {
    /// Creates an empty segmented store.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists.
    pub fn create(path: &Path, description: &str) -> CoreResult<Self> {
        Self::create_with_config(path, description, &StoreConfig::default())
    }

    /// Creates an empty segmented store with an explicit config.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists.
    pub fn create_with_config(
        path: &Path,
        description: &str,
        config: &StoreConfig,
    ) -> CoreResult<Self> {
        let core = StoreCore::create(path, description, StoreKind::Segmented, config)?;
        let primary = RedbMap::create(&path.join(PRIMARY_FILE))?;
        let subordinate = RedbMap::create(&path.join(SUBORDINATE_FILE))?;
        Ok(Self {
            core,
            maps: Some(SegmentMaps::new(
                Box::new(primary),
                Some(Box::new(subordinate)),
            )),
            position: Position::Start,
        })
    }

    /// Opens an existing segmented store.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for a missing store, or a strategy
    /// error if the control file or primary map is unusable.
    pub fn open(path: &Path, mode: Mode) -> CoreResult<Self> {
        Self::open_with_config(path, mode, &StoreConfig::default())
    }

    /// Opens an existing segmented store with an explicit config.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with_config(path: &Path, mode: Mode, config: &StoreConfig) -> CoreResult<Self> {
        let core = StoreCore::open(path, mode, config)?;
        if core.kind() != StoreKind::Segmented {
            return Err(CoreError::strategy(format!(
                "{} is a {} store, not Segmented",
                path.display(),
                core.kind()
            )));
        }
        let maps = open_maps(path, mode)?;
        Ok(Self {
            core,
            maps: Some(maps),
            position: Position::Start,
        })
    }

    fn maps(&self) -> CoreResult<&SegmentMaps> {
        self.maps.as_ref().ok_or_else(closed)
    }

    fn maps_mut(&mut self) -> CoreResult<&mut SegmentMaps> {
        self.maps.as_mut().ok_or_else(closed)
    }
}

impl RecordStore for SegmentedStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StoreCore {
        &mut self.core
    }

    fn space_used(&self) -> CoreResult<u64> {
        let dir = self.core.path();
        Ok(self.core.space_used()?
            + file_size(&dir.join(PRIMARY_FILE))?
            + file_size(&dir.join(SUBORDINATE_FILE))?)
    }

    fn sync(&mut self) -> CoreResult<()> {
        if self.core.mode().is_read_only() {
            return Ok(());
        }
        self.maps_mut()?.sync()?;
        self.core.sync()
    }

    fn insert(&mut self, key: &str, data: &[u8]) -> CoreResult<()> {
        self.core.ensure_writable()?;
        StoreCore::validate_key(key)?;
        let max_chunk = self.core.config().max_record_size;
        self.maps_mut()?.write(key, data, max_chunk)?;
        self.core.record_insert()
    }

    fn remove(&mut self, key: &str) -> CoreResult<()> {
        self.core.ensure_writable()?;
        self.maps_mut()?.remove(key)?;
        self.core.record_remove()
    }

    fn read(&self, key: &str) -> CoreResult<Vec<u8>> {
        self.maps()?.read(key)
    }

    fn length(&self, key: &str) -> CoreResult<u64> {
        self.maps()?.length(key)
    }

    fn flush(&mut self, key: &str) -> CoreResult<()> {
        self.core.ensure_writable()?;
        if !self.maps()?.primary.contains(key)? {
            return Err(missing_key(key));
        }
        Ok(())
    }

    fn sequence_key(&mut self, cursor: Cursor) -> CoreResult<String> {
        let primary = &self.maps()?.primary;
        let next = match (cursor, &self.position) {
            (Cursor::Start, _) | (_, Position::Start) => primary.first_key()?,
            (Cursor::Next, Position::After(key)) => primary.next_key_after(key)?,
            (Cursor::Next, Position::Before(key)) => primary.seek_key(key)?,
        };
        let key = next.ok_or_else(end_of_sequence)?;
        self.position = Position::After(key.clone());
        Ok(key)
    }

    fn set_cursor_at_key(&mut self, key: &str) -> CoreResult<()> {
        if !self.maps()?.primary.contains(key)? {
            return Err(missing_key(key));
        }
        self.position = Position::Before(key.to_owned());
        Ok(())
    }

    fn move_to(&mut self, new_path: &Path) -> CoreResult<()> {
        self.core.ensure_writable()?;
        if new_path.exists() {
            return Err(CoreError::object_exists(new_path.display().to_string()));
        }
        self.sync()?;
        self.maps = None;
        let moved = self.core.move_to(new_path);
        self.maps = Some(open_maps(self.core.path(), Mode::ReadWrite)?);
        moved
    }
}

fn open_maps(dir: &Path, mode: Mode) -> CoreResult<SegmentMaps> {
    let read_only = mode.is_read_only();
    let primary = RedbMap::open(&dir.join(PRIMARY_FILE), read_only)?;

    let subordinate_path = dir.join(SUBORDINATE_FILE);
    let subordinate: Option<Box<dyn OrderedMap>> = if subordinate_path.exists() {
        Some(Box::new(RedbMap::open(&subordinate_path, read_only)?))
    } else if read_only {
        None
    } else {
        info!("Adding subordinate map to {:?}", dir);
        Some(Box::new(RedbMap::create(&subordinate_path)?))
    };

    Ok(SegmentMaps::new(Box::new(primary), subordinate))
}

fn closed() -> CoreError {
    CoreError::strategy("segment maps are closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Records;
    use std::fs;
    use tempfile::tempdir;

    fn small_chunks() -> StoreConfig {
        StoreConfig::new().max_record_size(10)
    }

    #[test]
    fn large_record_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");
        let data: Vec<u8> = (0u8..25).collect();
        {
            let mut store =
                SegmentedStore::create_with_config(&path, "segments", &small_chunks()).unwrap();
            store.insert("A", &data).unwrap();
            assert_eq!(store.read("A").unwrap(), data);
            assert_eq!(store.length("A").unwrap(), 25);

            let keys: Vec<String> = Records::new(&mut store).map(|r| r.unwrap().key).collect();
            assert_eq!(keys, ["A"]);
        }

        let primary = RedbMap::open(&path.join(PRIMARY_FILE), true).unwrap();
        let subordinate = RedbMap::open(&path.join(SUBORDINATE_FILE), true).unwrap();
        assert_eq!(primary.value_len("A").unwrap(), Some(10));
        assert_eq!(subordinate.value_len("A&1").unwrap(), Some(10));
        assert_eq!(subordinate.value_len("A&2").unwrap(), Some(5));
        assert_eq!(subordinate.value_len("A&3").unwrap(), None);
    }

    #[test]
    fn sequence_in_key_order() {
        let dir = tempdir().unwrap();
        let mut store = SegmentedStore::create(&dir.path().join("seg"), "x").unwrap();
        for key in ["key3", "key1", "key2"] {
            store.insert(key, key.as_bytes()).unwrap();
        }

        assert_eq!(store.sequence_key(Cursor::Next).unwrap(), "key1");
        assert_eq!(store.sequence(Cursor::Next).unwrap().data, b"key2");
        assert_eq!(store.sequence_key(Cursor::Next).unwrap(), "key3");
        assert!(store.sequence_key(Cursor::Next).unwrap_err().is_not_found());
        assert_eq!(store.sequence_key(Cursor::Start).unwrap(), "key1");
    }

    #[test]
    fn set_cursor_then_remove_moves_on() {
        let dir = tempdir().unwrap();
        let mut store = SegmentedStore::create(&dir.path().join("seg"), "x").unwrap();
        for i in 1..=5 {
            store.insert(&format!("key{i}"), b"v").unwrap();
        }

        store.set_cursor_at_key("key3").unwrap();
        assert_eq!(store.sequence_key(Cursor::Next).unwrap(), "key3");

        store.set_cursor_at_key("key3").unwrap();
        store.remove("key3").unwrap();
        assert_eq!(store.sequence_key(Cursor::Next).unwrap(), "key4");
        assert!(store.set_cursor_at_key("key3").unwrap_err().is_not_found());
    }

    #[test]
    fn remove_and_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");
        {
            let mut store =
                SegmentedStore::create_with_config(&path, "x", &small_chunks()).unwrap();
            store.insert("big", &[9u8; 44]).unwrap();
            store.insert("small", b"s").unwrap();
            assert!(store.insert("big", b"again").unwrap_err().is_exists());
            store.remove("big").unwrap();
            assert!(store.remove("big").unwrap_err().is_not_found());
            store.insert("big", b"reborn").unwrap();
        }
        let store = SegmentedStore::open(&path, Mode::ReadOnly).unwrap();
        assert_eq!(store.count(), 2);
        assert_eq!(store.read("big").unwrap(), b"reborn");
    }

    #[test]
    fn missing_subordinate_is_tolerated_then_added() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");
        {
            let mut store = SegmentedStore::create(&path, "old layout").unwrap();
            store.insert("k", b"value").unwrap();
        }
        fs::remove_file(path.join(SUBORDINATE_FILE)).unwrap();

        {
            let store = SegmentedStore::open(&path, Mode::ReadOnly).unwrap();
            assert_eq!(store.read("k").unwrap(), b"value");
            assert_eq!(store.length("k").unwrap(), 5);
        }
        assert!(!path.join(SUBORDINATE_FILE).exists());

        let mut store =
            SegmentedStore::open_with_config(&path, Mode::ReadWrite, &small_chunks()).unwrap();
        assert!(path.join(SUBORDINATE_FILE).exists());
        store.insert("long", &[1u8; 15]).unwrap();
        assert_eq!(store.length("long").unwrap(), 15);
    }

    #[test]
    fn read_only_rejects_mutators() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");
        {
            let mut store = SegmentedStore::create(&path, "x").unwrap();
            store.insert("k", b"v").unwrap();
        }
        let mut store = SegmentedStore::open(&path, Mode::ReadOnly).unwrap();
        assert!(store.insert("k2", b"v").unwrap_err().is_strategy());
        assert!(store.remove("k").unwrap_err().is_strategy());
        assert!(store.flush("k").unwrap_err().is_strategy());
        assert!(store.move_to(&dir.path().join("m")).unwrap_err().is_strategy());
        assert_eq!(store.read("k").unwrap(), b"v");
    }

    #[test]
    fn move_reopens_maps() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        let mut store = SegmentedStore::create(&old, "x").unwrap();
        store.insert("k", b"v").unwrap();

        store.move_to(&new).unwrap();
        store.insert("k2", b"v2").unwrap();
        assert_eq!(store.read("k").unwrap(), b"v");
        assert!(new.join(PRIMARY_FILE).exists());
        assert!(!old.exists());
        assert!(store.space_used().unwrap() > 0);
    }
}
