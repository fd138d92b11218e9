//! A union whose membership survives restarts.
//!
//! ```text
//! <union>/
//! └─ .rsunion.prop    # "<member name> = <member path>" per line
//! ```

use super::{SharedStore, StoreUnion, Union};
use crate::error::{CoreError, CoreResult};
use crate::properties::{sync_directory, Properties};
use crate::types::Mode;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Name of the file mapping member names to paths.
pub const UNION_CONTROL_FILE: &str = ".rsunion.prop";

/// A [`StoreUnion`] whose membership is kept in a directory.
///
/// Member paths are stored relative to the union directory, so moving
/// the union together with its members keeps it openable.
#[derive(Debug)]
pub struct PersistentStoreUnion {
    path: PathBuf,
    members: Vec<(String, PathBuf)>,
    union: StoreUnion,
}

impl PersistentStoreUnion {
    /// Creates a union directory at `path` over existing stores and opens
    /// it read-only.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists, `ObjectDoesNotExist` for a
    /// missing member, or a parameter error for a name that cannot be
    /// stored.
    pub fn create<I, N, P>(path: &Path, members: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: AsRef<Path>,
    {
        Self::create_with_mode(path, members, Mode::ReadOnly)
    }

    /// [`create`](Self::create), opening the members in `mode`.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub fn create_with_mode<I, N, P>(path: &Path, members: I, mode: Mode) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: AsRef<Path>,
    {
        if path.exists() {
            return Err(CoreError::object_exists(path.display().to_string()));
        }

        let mut pending: Vec<(String, PathBuf)> = Vec::new();
        for (name, member) in members {
            let name = name.into();
            let member = member.as_ref();
            if !member.exists() {
                return Err(CoreError::not_found(member.display().to_string()));
            }
            if pending.iter().any(|(seen, _)| *seen == name) {
                return Err(CoreError::strategy(format!("duplicate union member name: {name}")));
            }
            pending.push((name, fs::canonicalize(member)?));
        }

        fs::create_dir_all(path)?;
        if let Err(e) = write_control(path, &pending) {
            if let Err(cleanup) = fs::remove_dir_all(path) {
                warn!("Cannot remove half-created union {:?}: {}", path, cleanup);
            }
            return Err(e);
        }
        info!("Created union at {:?} with {} members", path, pending.len());

        Self::open_with_mode(path, mode)
    }

    /// Opens the union at `path` with read-only members.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` for a missing directory or member, or
    /// a strategy error for an unreadable control file.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_mode(path, Mode::ReadOnly)
    }

    /// Opens the union at `path`, opening members in `mode`.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with_mode(path: &Path, mode: Mode) -> CoreResult<Self> {
        if !path.is_dir() {
            return Err(CoreError::not_found(path.display().to_string()));
        }
        let control = Properties::load(&path.join(UNION_CONTROL_FILE))?;
        let members: Vec<(String, PathBuf)> = control
            .iter()
            .map(|(name, stored)| {
                let stored = Path::new(stored);
                let resolved = if stored.is_absolute() {
                    stored.to_path_buf()
                } else {
                    path.join(stored)
                };
                (name.clone(), resolved)
            })
            .collect();
        let union = StoreUnion::from_paths(members.iter().cloned(), mode)?;

        Ok(Self {
            path: path.to_path_buf(),
            members,
            union,
        })
    }

    /// Returns the union directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns each member name with its resolved path.
    #[must_use]
    pub fn member_paths(&self) -> &[(String, PathBuf)] {
        &self.members
    }

    /// Returns the in-memory union.
    #[must_use]
    pub fn inner(&self) -> &StoreUnion {
        &self.union
    }
}

impl Union for PersistentStoreUnion {
    fn names(&self) -> Vec<String> {
        self.union.names()
    }

    fn store(&self, name: &str) -> CoreResult<SharedStore> {
        self.union.store(name)
    }

    fn read(&self, key: &str) -> CoreResult<BTreeMap<String, Vec<u8>>> {
        self.union.read(key)
    }

    fn length(&self, key: &str) -> CoreResult<BTreeMap<String, u64>> {
        self.union.length(key)
    }

    fn insert(&self, key: &str, data: &BTreeMap<String, Vec<u8>>) -> CoreResult<()> {
        self.union.insert(key, data)
    }

    fn replace(&self, key: &str, data: &BTreeMap<String, Vec<u8>>) -> CoreResult<()> {
        self.union.replace(key, data)
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.union.remove(key)
    }
}

fn write_control(path: &Path, members: &[(String, PathBuf)]) -> CoreResult<()> {
    let base = fs::canonicalize(path)?;
    let mut control = Properties::new();
    for (name, member) in members {
        let stored = relative_to(&base, member).unwrap_or_else(|| member.clone());
        let stored = stored.to_str().ok_or_else(|| {
            CoreError::parameter(format!("{} is not valid UTF-8", stored.display()))
        })?;
        control.set(name, stored)?;
    }
    control.save(&path.join(UNION_CONTROL_FILE), true)?;
    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }
    Ok(())
}

/// Expresses `target` relative to `base`. Both must be absolute.
///
/// Returns `None` when the paths share no root, as with different
/// Windows drives.
fn relative_to(base: &Path, target: &Path) -> Option<PathBuf> {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = target.components().collect();
    let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();
    if common == 0 {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for part in &target[common..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Some(relative)
}
