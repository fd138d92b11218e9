//! Temporary stores and common scenarios.

use recstore_core::{
    create_record_store_with_config, open_record_store_with_config, Mode, RecordStore,
    StoreConfig, StoreKind,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A store in its own temporary directory, removed on drop.
pub struct TestStore {
    /// The open store.
    pub store: Box<dyn RecordStore>,
    path: PathBuf,
    config: StoreConfig,
    temp_dir: TempDir,
}

impl TestStore {
    /// Creates an empty store of `kind` with the default config.
    pub fn new(kind: StoreKind) -> Self {
        Self::with_config(kind, &StoreConfig::default())
    }

    /// Creates an empty store of `kind` with `config`.
    pub fn with_config(kind: StoreKind, config: &StoreConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("store");
        let store = create_record_store_with_config(&path, "test store", kind, config)
            .expect("Failed to create store");
        Self {
            store,
            path,
            config: config.clone(),
            temp_dir,
        }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the temporary directory holding the store, for siblings.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Closes the store and opens it again in `mode`.
    pub fn reopen(self, mode: Mode) -> Self {
        let Self {
            store,
            path,
            config,
            temp_dir,
        } = self;
        drop(store);
        let store =
            open_record_store_with_config(&path, mode, &config).expect("Failed to reopen store");
        Self {
            store,
            path,
            config,
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = dyn RecordStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

impl std::ops::DerefMut for TestStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.store.as_mut()
    }
}

/// Runs `f` against a fresh temporary store of `kind`.
pub fn with_temp_store<F, R>(kind: StoreKind, f: F) -> R
where
    F: FnOnce(&mut dyn RecordStore) -> R,
{
    let mut test_store = TestStore::new(kind);
    f(test_store.store.as_mut())
}

/// Returns the payload stored under `key` by [`scenarios::populated`].
pub fn payload_for(key: &str) -> Vec<u8> {
    format!("payload of {key}").into_bytes()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Returns the keys written by [`populated`].
    pub fn keys(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("key{i:04}")).collect()
    }

    /// Creates a store of `kind` holding `count` records.
    pub fn populated(kind: StoreKind, count: usize) -> TestStore {
        let mut test_store = TestStore::new(kind);
        for key in keys(count) {
            test_store
                .insert(&key, &payload_for(&key))
                .expect("Failed to insert record");
        }
        test_store
    }

    /// Creates stores named by `names` side by side in one temporary
    /// directory, each holding `key` unless listed in `without`.
    pub fn siblings(
        kind: StoreKind,
        names: &[&str],
        key: &str,
        without: &[&str],
    ) -> (TempDir, Vec<(String, PathBuf)>) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut members = Vec::with_capacity(names.len());
        for name in names {
            let path = temp_dir.path().join(name);
            let mut store =
                create_record_store_with_config(&path, name, kind, &StoreConfig::default())
                    .expect("Failed to create store");
            if !without.contains(name) {
                store
                    .insert(key, name.as_bytes())
                    .expect("Failed to insert record");
            }
            members.push(((*name).to_owned(), path));
        }
        (temp_dir, members)
    }
}
