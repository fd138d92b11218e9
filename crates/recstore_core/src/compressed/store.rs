//! Compression overlay over two inner stores.

use super::compressor::{Compressor, CompressorKind};
use crate::config::StoreConfig;
use crate::core::StoreCore;
use crate::error::{CoreError, CoreResult};
use crate::factory::{create_record_store_with_config, open_record_store_with_config};
use crate::store::RecordStore;
use crate::types::{Cursor, Mode, StoreKind};
use std::path::Path;
use tracing::{error, warn};

/// Subdirectory holding compressed payloads.
pub const BACKING_DIR: &str = "theBackingStore";
/// Subdirectory holding the decimal uncompressed lengths.
pub const METADATA_DIR: &str = "theBackingStore_md";
/// Property naming the compressor.
pub const COMPRESSOR_PROPERTY: &str = "Compressor_Type";

struct Inner {
    backing: Box<dyn RecordStore>,
    metadata: Box<dyn RecordStore>,
}

/// A store that compresses payloads into one inner store and records
/// their original lengths in another.
///
/// `length` only reads the small metadata entry. Sequencing follows the
/// backing store's key order.
pub struct CompressedStore {
    core: StoreCore,
    inner: Option<Inner>,
    compressor: Box<dyn Compressor>,
}

impl std::fmt::Debug for CompressedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedStore")
            .field("core", &self.core)
            .field("compressor", &self.compressor.kind())
            .finish_non_exhaustive()
    }
}

impl CompressedStore {
    /// Creates an empty zstd-compressed store.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists.
    pub fn create(path: &Path, description: &str) -> CoreResult<Self> {
        Self::create_with_config(path, description, CompressorKind::Zstd, &StoreConfig::default())
    }

    /// Creates an empty compressed store with an explicit compressor and
    /// config. The inner stores use [`StoreConfig::inner_kind`].
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists, or a parameter error for
    /// an unusable inner kind.
    pub fn create_with_config(
        path: &Path,
        description: &str,
        compressor: CompressorKind,
        config: &StoreConfig,
    ) -> CoreResult<Self> {
        let mut core = StoreCore::create(path, description, StoreKind::Compressed, config)?;
        core.reserve_property(COMPRESSOR_PROPERTY);
        core.set_property(COMPRESSOR_PROPERTY, &compressor.to_string())?;

        let backing = create_record_store_with_config(
            &path.join(BACKING_DIR),
            "compressed payloads",
            config.inner_kind,
            config,
        )?;
        let metadata = create_record_store_with_config(
            &path.join(METADATA_DIR),
            "uncompressed lengths",
            config.inner_kind,
            config,
        )?;

        Ok(Self {
            core,
            inner: Some(Inner { backing, metadata }),
            compressor: compressor.build(config.compression_level),
        })
    }

    /// Opens an existing compressed store.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for a missing store, or a strategy
    /// error for an unknown compressor or unusable inner store.
    pub fn open(path: &Path, mode: Mode) -> CoreResult<Self> {
        Self::open_with_config(path, mode, &StoreConfig::default())
    }

    /// Opens an existing compressed store with an explicit config.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with_config(path: &Path, mode: Mode, config: &StoreConfig) -> CoreResult<Self> {
        let mut core = StoreCore::open(path, mode, config)?;
        if core.kind() != StoreKind::Compressed {
            return Err(CoreError::strategy(format!(
                "{} is a {} store, not Compressed",
                path.display(),
                core.kind()
            )));
        }
        core.reserve_property(COMPRESSOR_PROPERTY);
        let kind: CompressorKind = core
            .property(COMPRESSOR_PROPERTY)
            .ok_or_else(|| {
                CoreError::strategy(format!(
                    "{} lacks {COMPRESSOR_PROPERTY}",
                    path.display()
                ))
            })?
            .parse()?;

        let inner = open_inner(path, mode, config)?;
        Ok(Self {
            core,
            inner: Some(inner),
            compressor: kind.build(config.compression_level),
        })
    }

    /// Returns the compressor kind.
    #[must_use]
    pub fn compressor_kind(&self) -> CompressorKind {
        self.compressor.kind()
    }

    fn inner(&self) -> CoreResult<&Inner> {
        self.inner
            .as_ref()
            .ok_or_else(|| CoreError::strategy("inner stores are closed"))
    }

    fn inner_mut(&mut self) -> CoreResult<&mut Inner> {
        self.inner
            .as_mut()
            .ok_or_else(|| CoreError::strategy("inner stores are closed"))
    }
}

impl RecordStore for CompressedStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StoreCore {
        &mut self.core
    }

    fn space_used(&self) -> CoreResult<u64> {
        let inner = self.inner()?;
        Ok(self.core.space_used()? + inner.backing.space_used()? + inner.metadata.space_used()?)
    }

    fn sync(&mut self) -> CoreResult<()> {
        if self.core.mode().is_read_only() {
            return Ok(());
        }
        let inner = self.inner_mut()?;
        inner.backing.sync()?;
        inner.metadata.sync()?;
        self.core.sync()
    }

    fn insert(&mut self, key: &str, data: &[u8]) -> CoreResult<()> {
        self.core.ensure_writable()?;
        StoreCore::validate_key(key)?;
        if self.inner()?.backing.contains_key(key)? {
            return Err(CoreError::object_exists(key));
        }

        let packed = self.compressor.compress(data)?;
        let inner = self.inner_mut()?;
        inner.backing.insert(key, &packed)?;
        let size = data.len().to_string();
        if let Err(e) = inner.metadata.insert(key, size.as_bytes()) {
            if let Err(undo) = inner.backing.remove(key) {
                warn!("Cannot remove payload of {} after metadata failure: {}", key, undo);
            }
            return Err(e);
        }
        self.core.record_insert()
    }

    fn remove(&mut self, key: &str) -> CoreResult<()> {
        self.core.ensure_writable()?;
        let inner = self.inner_mut()?;
        inner.backing.remove(key)?;
        if let Err(e) = inner.metadata.remove(key) {
            error!("Removed payload of {} but its length entry remains: {}", key, e);
            return Err(CoreError::strategy(format!(
                "payload of {key} removed but metadata entry {key} remains: {e}"
            )));
        }
        self.core.record_remove()
    }

    fn read(&self, key: &str) -> CoreResult<Vec<u8>> {
        let inner = self.inner()?;
        let packed = inner.backing.read(key)?;
        let data = self.compressor.decompress(&packed)?;
        let expected = self.length(key)?;
        if data.len() as u64 != expected {
            return Err(CoreError::strategy(format!(
                "{key} decompressed to {} bytes, metadata says {expected}",
                data.len()
            )));
        }
        Ok(data)
    }

    fn length(&self, key: &str) -> CoreResult<u64> {
        let raw = self.inner()?.metadata.read(key)?;
        std::str::from_utf8(&raw)
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok())
            .ok_or_else(|| CoreError::strategy(format!("corrupt length entry for {key}")))
    }

    fn flush(&mut self, key: &str) -> CoreResult<()> {
        self.core.ensure_writable()?;
        let inner = self.inner_mut()?;
        inner.backing.flush(key)?;
        inner.metadata.flush(key)
    }

    fn sequence_key(&mut self, cursor: Cursor) -> CoreResult<String> {
        self.inner_mut()?.backing.sequence_key(cursor)
    }

    fn set_cursor_at_key(&mut self, key: &str) -> CoreResult<()> {
        self.inner_mut()?.backing.set_cursor_at_key(key)
    }

    fn move_to(&mut self, new_path: &Path) -> CoreResult<()> {
        self.core.ensure_writable()?;
        if new_path.exists() {
            return Err(CoreError::object_exists(new_path.display().to_string()));
        }
        self.sync()?;
        self.inner = None;
        let moved = self.core.move_to(new_path);
        let config = self.core.config().clone();
        self.inner = Some(open_inner(self.core.path(), Mode::ReadWrite, &config)?);
        moved
    }
}

fn open_inner(path: &Path, mode: Mode, config: &StoreConfig) -> CoreResult<Inner> {
    Ok(Inner {
        backing: open_record_store_with_config(&path.join(BACKING_DIR), mode, config)?,
        metadata: open_record_store_with_config(&path.join(METADATA_DIR), mode, config)?,
    })
}
