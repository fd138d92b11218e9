//! Opening, creating, removing and merging stores by path.
//!
//! The concrete backend is chosen from the `Type` property in the
//! store's control file.

use crate::archive::ArchiveStore;
use crate::compressed::{CompressedStore, CompressorKind};
use crate::config::StoreConfig;
use crate::core::StoreCore;
use crate::error::{CoreError, CoreResult};
use crate::file::FileStore;
use crate::list::ListStore;
use crate::segmented::SegmentedStore;
use crate::store::{RecordStore, Records};
use crate::types::{Mode, StoreKind};
use std::fs;
use std::path::Path;
use tracing::info;

/// Opens the store at `path` as whatever kind it was created as.
///
/// # Errors
///
/// Returns `ObjectDoesNotExist` for a missing directory, or a strategy
/// error for a missing control file, an unknown type, or a list store
/// opened read-write.
pub fn open_record_store(path: &Path, mode: Mode) -> CoreResult<Box<dyn RecordStore>> {
    open_record_store_with_config(path, mode, &StoreConfig::default())
}

/// [`open_record_store`] with an explicit config.
///
/// # Errors
///
/// Same as [`open_record_store`].
pub fn open_record_store_with_config(
    path: &Path,
    mode: Mode,
    config: &StoreConfig,
) -> CoreResult<Box<dyn RecordStore>> {
    let store: Box<dyn RecordStore> = match StoreCore::read_kind(path)? {
        StoreKind::Archive => Box::new(ArchiveStore::open_with_config(path, mode, config)?),
        StoreKind::Segmented => Box::new(SegmentedStore::open_with_config(path, mode, config)?),
        StoreKind::Compressed => Box::new(CompressedStore::open_with_config(path, mode, config)?),
        StoreKind::File => Box::new(FileStore::open_with_config(path, mode, config)?),
        StoreKind::List => Box::new(ListStore::open_with_config(path, mode, config)?),
    };
    Ok(store)
}

/// Creates an empty store of `kind`.
///
/// # Errors
///
/// Returns `ObjectExists` if `path` exists, or a strategy error for
/// [`StoreKind::List`], whose stores are made by [`ListStore::create`].
pub fn create_record_store(
    path: &Path,
    description: &str,
    kind: StoreKind,
) -> CoreResult<Box<dyn RecordStore>> {
    create_record_store_with_config(path, description, kind, &StoreConfig::default())
}

/// [`create_record_store`] with an explicit config.
///
/// # Errors
///
/// Same as [`create_record_store`].
pub fn create_record_store_with_config(
    path: &Path,
    description: &str,
    kind: StoreKind,
    config: &StoreConfig,
) -> CoreResult<Box<dyn RecordStore>> {
    let store: Box<dyn RecordStore> = match kind {
        StoreKind::Archive => {
            Box::new(ArchiveStore::create_with_config(path, description, config)?)
        }
        StoreKind::Segmented => {
            Box::new(SegmentedStore::create_with_config(path, description, config)?)
        }
        StoreKind::Compressed => Box::new(CompressedStore::create_with_config(
            path,
            description,
            CompressorKind::default(),
            config,
        )?),
        StoreKind::File => Box::new(FileStore::create_with_config(path, description, config)?),
        StoreKind::List => {
            return Err(CoreError::strategy(
                "list stores are created from a source store and key list",
            ))
        }
    };
    Ok(store)
}

/// Deletes the store at `path` after checking that it opens as a store.
///
/// # Errors
///
/// Returns `ObjectDoesNotExist` for a missing path, or the error that
/// prevented the store from opening.
pub fn remove_record_store(path: &Path) -> CoreResult<()> {
    let kind = StoreCore::read_kind(path)?;
    drop(open_record_store(path, Mode::ReadOnly)?);
    fs::remove_dir_all(path)?;
    info!("Removed {} store at {:?}", kind, path);
    Ok(())
}

/// Creates a store of `kind` at `merge_path` holding every record of
/// every source, visited in source order then sequence order.
///
/// # Errors
///
/// Returns a strategy error for a Compressed or List kind,
/// `ObjectExists` if two sources share a key, or any error raised while
/// reading a source.
pub fn merge_record_stores<P: AsRef<Path>>(
    merge_path: &Path,
    description: &str,
    kind: StoreKind,
    sources: &[P],
) -> CoreResult<Box<dyn RecordStore>> {
    merge_record_stores_with_config(merge_path, description, kind, sources, &StoreConfig::default())
}

/// [`merge_record_stores`] with an explicit config for the new store.
///
/// # Errors
///
/// Same as [`merge_record_stores`].
pub fn merge_record_stores_with_config<P: AsRef<Path>>(
    merge_path: &Path,
    description: &str,
    kind: StoreKind,
    sources: &[P],
    config: &StoreConfig,
) -> CoreResult<Box<dyn RecordStore>> {
    if matches!(kind, StoreKind::Compressed | StoreKind::List) {
        return Err(CoreError::strategy(format!(
            "cannot merge into a {kind} store"
        )));
    }

    let mut merged = create_record_store_with_config(merge_path, description, kind, config)?;
    for source in sources {
        let mut source = open_record_store_with_config(source.as_ref(), Mode::ReadOnly, config)?;
        for record in Records::new(source.as_mut()) {
            let record = record?;
            merged.insert(&record.key, &record.data)?;
        }
    }
    merged.sync()?;
    info!(
        "Merged {} stores into {:?} ({} records)",
        sources.len(),
        merge_path,
        merged.count()
    );
    Ok(merged)
}
