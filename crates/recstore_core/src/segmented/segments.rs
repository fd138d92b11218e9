//! Splitting records across a primary and a subordinate map.
//!
//! Chunk 0 of a record lives under its key in the primary map. Chunks
//! 1..n live under `key&1`, `key&2`, ... in the subordinate map, so a walk
//! over primary keys never meets a continuation chunk. A lookup miss in
//! the subordinate map ends a record.

use crate::core::StoreCore;
use crate::error::{buffer_with_capacity, CoreError, CoreResult};
use crate::store::missing_key;
use recstore_storage::OrderedMap;
use tracing::warn;

pub(crate) struct SegmentMaps {
    pub(crate) primary: Box<dyn OrderedMap>,
    /// Absent only for a pre-segmentation store opened read-only.
    pub(crate) subordinate: Option<Box<dyn OrderedMap>>,
}

impl SegmentMaps {
    pub(crate) fn new(
        primary: Box<dyn OrderedMap>,
        subordinate: Option<Box<dyn OrderedMap>>,
    ) -> Self {
        Self {
            primary,
            subordinate,
        }
    }

    /// Writes `data` in chunks of at most `max_chunk` bytes.
    ///
    /// Leftover continuation chunks of an earlier interrupted write are
    /// cleared first. If any chunk write fails, the chunks already written
    /// are removed again and the original error is returned.
    pub(crate) fn write(&mut self, key: &str, data: &[u8], max_chunk: u64) -> CoreResult<()> {
        if self.primary.contains(key)? {
            return Err(CoreError::object_exists(key));
        }
        self.clear_continuation(key)?;

        let max_chunk = usize::try_from(max_chunk).unwrap_or(usize::MAX);
        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(max_chunk).collect()
        };

        for (segment, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.write_chunk(key, segment as u64, chunk) {
                self.roll_back(key, segment as u64);
                return Err(e);
            }
        }
        Ok(())
    }

    fn write_chunk(&mut self, key: &str, segment: u64, chunk: &[u8]) -> CoreResult<()> {
        let name = StoreCore::gen_segment_key_name(key, segment);
        if segment == 0 {
            self.primary.insert_new(&name, chunk)?;
        } else {
            self.subordinate_mut()?.insert_new(&name, chunk)?;
        }
        Ok(())
    }

    fn roll_back(&mut self, key: &str, written: u64) {
        for segment in 0..written {
            let name = StoreCore::gen_segment_key_name(key, segment);
            let removed = if segment == 0 {
                self.primary.remove(&name)
            } else {
                match self.subordinate.as_mut() {
                    Some(map) => map.remove(&name),
                    None => Ok(false),
                }
            };
            if let Err(e) = removed {
                warn!("Cannot roll back chunk {} of {}: {}", segment, key, e);
            }
        }
        if written > 0 {
            warn!("Rolled back {} chunks of partially written {}", written, key);
        }
    }

    fn clear_continuation(&mut self, key: &str) -> CoreResult<()> {
        let Some(map) = self.subordinate.as_mut() else {
            return Ok(());
        };
        let mut segment = 1;
        while map.remove(&StoreCore::gen_segment_key_name(key, segment))? {
            segment += 1;
        }
        if segment > 1 {
            warn!("Cleared {} orphaned chunks of {}", segment - 1, key);
        }
        Ok(())
    }

    fn subordinate_mut(&mut self) -> CoreResult<&mut Box<dyn OrderedMap>> {
        self.subordinate
            .as_mut()
            .ok_or_else(|| CoreError::strategy("store has no subordinate map"))
    }

    /// Returns the total length of `key` without reading any chunk.
    pub(crate) fn length(&self, key: &str) -> CoreResult<u64> {
        let mut total = self.primary.value_len(key)?.ok_or_else(|| missing_key(key))?;
        if let Some(map) = &self.subordinate {
            let mut segment = 1;
            while let Some(len) = map.value_len(&StoreCore::gen_segment_key_name(key, segment))? {
                total += len;
                segment += 1;
            }
        }
        Ok(total)
    }

    /// Reassembles `key` from its chunks.
    pub(crate) fn read(&self, key: &str) -> CoreResult<Vec<u8>> {
        let total = self.length(key)?;
        let mut out = buffer_with_capacity(total)?;

        let first = self.primary.get(key)?.ok_or_else(|| missing_key(key))?;
        out.extend_from_slice(&first);
        if let Some(map) = &self.subordinate {
            let mut segment = 1;
            while let Some(chunk) = map.get(&StoreCore::gen_segment_key_name(key, segment))? {
                out.extend_from_slice(&chunk);
                segment += 1;
            }
        }
        Ok(out)
    }

    /// Removes chunk 0, then every continuation chunk.
    pub(crate) fn remove(&mut self, key: &str) -> CoreResult<()> {
        if !self.primary.remove(key)? {
            return Err(missing_key(key));
        }
        if let Some(map) = self.subordinate.as_mut() {
            let mut segment = 1;
            while map.remove(&StoreCore::gen_segment_key_name(key, segment))? {
                segment += 1;
            }
        }
        Ok(())
    }

    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        self.primary.sync()?;
        if let Some(map) = self.subordinate.as_mut() {
            map.sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recstore_storage::{MemoryMap, StorageError, StorageResult};

    fn maps() -> (SegmentMaps, MemoryMap, MemoryMap) {
        let primary = MemoryMap::new();
        let subordinate = MemoryMap::new();
        let maps = SegmentMaps::new(
            Box::new(primary.clone()),
            Some(Box::new(subordinate.clone())),
        );
        (maps, primary, subordinate)
    }

    #[test]
    fn oversized_record_is_split() {
        let (mut maps, primary, subordinate) = maps();
        let data: Vec<u8> = (0..25).collect();

        maps.write("A", &data, 10).unwrap();

        assert_eq!(primary.keys(), ["A"]);
        assert_eq!(subordinate.keys(), ["A&1", "A&2"]);
        assert_eq!(primary.value_len("A").unwrap(), Some(10));
        assert_eq!(subordinate.value_len("A&1").unwrap(), Some(10));
        assert_eq!(subordinate.value_len("A&2").unwrap(), Some(5));
        assert_eq!(maps.read("A").unwrap(), data);
        assert_eq!(maps.length("A").unwrap(), 25);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let (mut maps, _, subordinate) = maps();
        maps.write("B", &[7u8; 20], 10).unwrap();
        assert_eq!(subordinate.keys(), ["B&1"]);
    }

    #[test]
    fn empty_record_is_one_empty_chunk() {
        let (mut maps, primary, subordinate) = maps();
        maps.write("E", b"", 10).unwrap();
        assert_eq!(primary.value_len("E").unwrap(), Some(0));
        assert!(subordinate.is_empty());
        assert!(maps.read("E").unwrap().is_empty());
    }

    #[test]
    fn remove_walks_every_chunk() {
        let (mut maps, primary, subordinate) = maps();
        maps.write("A", &[1u8; 35], 10).unwrap();
        maps.remove("A").unwrap();
        assert!(primary.is_empty());
        assert!(subordinate.is_empty());
        assert!(maps.remove("A").unwrap_err().is_not_found());
        assert!(maps.read("A").unwrap_err().is_not_found());
    }

    #[test]
    fn orphans_are_cleared_before_write() {
        let (mut maps, _, mut subordinate) = maps();
        subordinate.insert_new("A&1", b"stale").unwrap();
        subordinate.insert_new("A&2", b"stale").unwrap();

        maps.write("A", b"short", 10).unwrap();
        assert!(subordinate.is_empty());
        assert_eq!(maps.read("A").unwrap(), b"short");
    }

    /// A map that refuses writes once `budget` inserts have happened.
    struct Failing {
        inner: MemoryMap,
        budget: usize,
    }

    impl OrderedMap for Failing {
        fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }
        fn value_len(&self, key: &str) -> StorageResult<Option<u64>> {
            self.inner.value_len(key)
        }
        fn insert_new(&mut self, key: &str, value: &[u8]) -> StorageResult<()> {
            if self.budget == 0 {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.budget -= 1;
            self.inner.insert_new(key, value)
        }
        fn remove(&mut self, key: &str) -> StorageResult<bool> {
            self.inner.remove(key)
        }
        fn first_key(&self) -> StorageResult<Option<String>> {
            self.inner.first_key()
        }
        fn next_key_after(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.next_key_after(key)
        }
        fn seek_key(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.seek_key(key)
        }
        fn sync(&mut self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_chunk_rolls_back_earlier_chunks() {
        let primary = MemoryMap::new();
        let subordinate = MemoryMap::new();
        let mut maps = SegmentMaps::new(
            Box::new(primary.clone()),
            Some(Box::new(Failing {
                inner: subordinate.clone(),
                budget: 1,
            })),
        );

        let err = maps.write("A", &[0u8; 30], 10).unwrap_err();
        assert!(err.is_strategy());
        assert!(primary.is_empty());
        assert!(subordinate.is_empty());
    }

    #[test]
    fn missing_subordinate_reads_first_chunk_only() {
        let primary = MemoryMap::new();
        let mut writer = SegmentMaps::new(Box::new(primary.clone()), None);
        writer.write("small", b"fits", 10).unwrap();
        assert!(writer.write("big", &[0u8; 11], 10).unwrap_err().is_strategy());
        assert_eq!(primary.keys(), ["small"]);

        let reader = SegmentMaps::new(Box::new(primary.read_only_view()), None);
        assert_eq!(reader.read("small").unwrap(), b"fits");
    }
}
