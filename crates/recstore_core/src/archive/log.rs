//! Blob log plus manifest, independent of any directory layout.

use super::manifest::ManifestEntry;
use crate::error::{CoreError, CoreResult};
use crate::store::missing_key;
use recstore_storage::StorageBackend;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Index into `order`, fixed at the key's first appearance.
    position: usize,
    /// `(offset, size)` of the live payload.
    live: Option<(u64, u64)>,
}

/// The data half of an archive store.
///
/// Payloads are appended to the blob log and described by one manifest
/// line each. The blob append always happens before the manifest append,
/// so a crash can leave unreferenced blob bytes but never a manifest line
/// pointing past the blob.
///
/// The whole manifest is replayed when the log is loaded; the last line
/// for a key decides its state. Keys keep the position of their first
/// appearance for sequencing, even across remove and reinsert.
pub struct ArchiveLog {
    blob: Box<dyn StorageBackend>,
    manifest: Box<dyn StorageBackend>,
    index: HashMap<String, Slot>,
    order: Vec<String>,
    live: u64,
    lines: u64,
}

impl ArchiveLog {
    /// Replays `manifest` against `blob`.
    ///
    /// A final line without its newline is a torn write and is ignored.
    /// With `repair` set it is also cut off so later appends start on a
    /// clean line.
    ///
    /// # Errors
    ///
    /// Returns a strategy error for an unreadable or malformed manifest,
    /// or for an entry that references bytes past the end of the blob.
    pub fn load(
        blob: Box<dyn StorageBackend>,
        mut manifest: Box<dyn StorageBackend>,
        repair: bool,
    ) -> CoreResult<Self> {
        let manifest_size = manifest.size()?;
        let raw = manifest.read_at(0, to_usize(manifest_size)?)?;

        let complete = match raw.iter().rposition(|&b| b == b'\n') {
            Some(last) => last + 1,
            None => 0,
        };
        if complete < raw.len() {
            warn!(
                "Ignoring torn manifest tail of {} bytes",
                raw.len() - complete
            );
            if repair {
                manifest.truncate(complete as u64)?;
            }
        }

        let text = std::str::from_utf8(&raw[..complete])
            .map_err(|e| CoreError::strategy(format!("manifest is not UTF-8: {e}")))?;

        let blob_size = blob.size()?;
        let mut log = Self {
            blob,
            manifest,
            index: HashMap::new(),
            order: Vec::new(),
            live: 0,
            lines: 0,
        };
        for line in text.lines() {
            let entry = ManifestEntry::parse_line(line)?;
            if let Some(offset) = entry.offset {
                if offset.saturating_add(entry.size) > blob_size {
                    return Err(CoreError::strategy(format!(
                        "manifest entry for {} ends past the archive ({} + {} > {})",
                        entry.key, offset, entry.size, blob_size
                    )));
                }
            }
            log.apply(&entry);
        }
        Ok(log)
    }

    fn apply(&mut self, entry: &ManifestEntry) {
        self.lines += 1;
        let next_position = self.order.len();
        let slot = self.index.entry(entry.key.clone()).or_insert_with(|| Slot {
            position: next_position,
            live: None,
        });
        if slot.position == next_position {
            self.order.push(entry.key.clone());
        }

        let was_live = slot.live.is_some();
        slot.live = entry.offset.map(|offset| (offset, entry.size));
        match (was_live, slot.live.is_some()) {
            (false, true) => self.live += 1,
            (true, false) => self.live -= 1,
            _ => {}
        }
    }

    fn live_slot(&self, key: &str) -> CoreResult<(u64, u64)> {
        self.index
            .get(key)
            .and_then(|slot| slot.live)
            .ok_or_else(|| missing_key(key))
    }

    /// Appends a payload for a key that is not currently live.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if the key is live, or a strategy error if
    /// either append fails.
    pub fn append(&mut self, key: &str, data: &[u8]) -> CoreResult<()> {
        if self.contains(key) {
            return Err(CoreError::object_exists(key));
        }
        let offset = self.blob.append(data)?;
        let entry = ManifestEntry::live(key, data.len() as u64, offset);
        self.append_line(&entry)
    }

    /// Appends a tombstone for a live key. Blob bytes are left in place.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` if the key is not live.
    pub fn tombstone(&mut self, key: &str) -> CoreResult<()> {
        self.live_slot(key)?;
        let entry = ManifestEntry::tombstone(key);
        self.append_line(&entry)
    }

    /// Appends one manifest line. A partially written line is cut off
    /// again so the next append starts on a clean line.
    fn append_line(&mut self, entry: &ManifestEntry) -> CoreResult<()> {
        let before = self.manifest.size()?;
        if let Err(e) = self.manifest.append(entry.to_line().as_bytes()) {
            match self.manifest.size() {
                Ok(now) if now > before => {
                    if let Err(undo) = self.manifest.truncate(before) {
                        warn!("Cannot cut torn manifest line for {}: {}", entry.key, undo);
                    }
                }
                Ok(_) => {}
                Err(undo) => warn!("Cannot inspect manifest after failed append: {}", undo),
            }
            return Err(e.into());
        }
        self.apply(entry);
        Ok(())
    }

    /// Reads the live payload of `key`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` if the key is not live, or a memory
    /// error if the payload cannot be addressed.
    pub fn read(&self, key: &str) -> CoreResult<Vec<u8>> {
        let (offset, size) = self.live_slot(key)?;
        Ok(self.blob.read_at(offset, to_usize(size)?)?)
    }

    /// Returns the payload length of `key`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` if the key is not live.
    pub fn length(&self, key: &str) -> CoreResult<u64> {
        Ok(self.live_slot(key)?.1)
    }

    /// Returns true if `key` is live.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.get(key).is_some_and(|slot| slot.live.is_some())
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn live_count(&self) -> u64 {
        self.live
    }

    /// Returns true if the manifest holds tombstones or superseded lines.
    #[must_use]
    pub fn needs_vacuum(&self) -> bool {
        self.lines > self.live
    }

    /// Returns the first live key at sequencing position `from` or later,
    /// with its position.
    #[must_use]
    pub fn live_key_from(&self, from: usize) -> Option<(usize, &str)> {
        self.order
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, key)| self.contains(key))
            .map(|(position, key)| (position, key.as_str()))
    }

    /// Returns the sequencing position of a live key.
    #[must_use]
    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.index
            .get(key)
            .filter(|slot| slot.live.is_some())
            .map(|slot| slot.position)
    }

    /// Iterates over live keys in sequencing order.
    pub fn live_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.order
            .iter()
            .filter(|key| self.contains(key))
            .map(String::as_str)
    }

    /// Returns `(blob bytes, manifest bytes)`.
    ///
    /// # Errors
    ///
    /// Returns a strategy error if a size cannot be determined.
    pub fn sizes(&self) -> CoreResult<(u64, u64)> {
        Ok((self.blob.size()?, self.manifest.size()?))
    }

    /// Flushes both logs to the operating system.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on I/O failure.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.blob.flush()?;
        self.manifest.flush()?;
        Ok(())
    }

    /// Syncs both logs to disk, blob first.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on I/O failure.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.blob.sync()?;
        self.manifest.sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for ArchiveLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveLog")
            .field("live", &self.live)
            .field("lines", &self.lines)
            .finish_non_exhaustive()
    }
}

fn to_usize(len: u64) -> CoreResult<usize> {
    usize::try_from(len)
        .map_err(|_| CoreError::memory(format!("{len} bytes exceed the address space")))
}
