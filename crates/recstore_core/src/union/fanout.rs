//! Gather-then-report fan-out over open member stores.

use super::{shared, SharedStore, Union};
use crate::error::{CoreError, CoreResult};
use crate::factory::open_record_store;
use crate::store::RecordStore;
use crate::types::Mode;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::warn;

/// A union over independently opened member stores.
pub struct StoreUnion {
    members: Vec<(String, SharedStore)>,
}

impl std::fmt::Debug for StoreUnion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreUnion")
            .field("members", &self.names())
            .finish()
    }
}

impl StoreUnion {
    /// Opens every `(name, path)` pair in `mode`.
    ///
    /// # Errors
    ///
    /// Returns a strategy error for a repeated name, or the error of the
    /// first member that fails to open.
    pub fn from_paths<I, N, P>(pairs: I, mode: Mode) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: AsRef<Path>,
    {
        let pairs: Vec<(String, P)> = pairs.into_iter().map(|(n, p)| (n.into(), p)).collect();
        check_unique(pairs.iter().map(|(name, _)| name.as_str()))?;

        let mut members = Vec::with_capacity(pairs.len());
        for (name, path) in pairs {
            let store = open_record_store(path.as_ref(), mode)?;
            members.push((name, shared(store)));
        }
        Ok(Self { members })
    }

    /// Builds a union over stores the caller already holds.
    ///
    /// # Errors
    ///
    /// Returns a strategy error for a repeated name.
    pub fn from_stores<I, N>(pairs: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (N, SharedStore)>,
        N: Into<String>,
    {
        let members: Vec<(String, SharedStore)> =
            pairs.into_iter().map(|(n, s)| (n.into(), s)).collect();
        check_unique(members.iter().map(|(name, _)| name.as_str()))?;
        Ok(Self { members })
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the union has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn check_payloads(&self, data: &BTreeMap<String, Vec<u8>>) -> CoreResult<()> {
        if data.len() < self.members.len() {
            return Err(CoreError::parameter(format!(
                "{} payloads given for {} members",
                data.len(),
                self.members.len()
            )));
        }
        for name in data.keys() {
            if !self.members.iter().any(|(member, _)| member == name) {
                return Err(CoreError::not_found(name.clone()));
            }
        }
        Ok(())
    }

    fn write_each<F>(
        &self,
        op: &str,
        key: &str,
        data: &BTreeMap<String, Vec<u8>>,
        mut write: F,
    ) -> CoreResult<()>
    where
        F: FnMut(&mut dyn RecordStore, &[u8]) -> CoreResult<()>,
    {
        self.check_payloads(data)?;
        let mut failures = Vec::new();
        for (name, store) in &self.members {
            let Some(payload) = data.get(name) else {
                continue;
            };
            let mut store = store.lock();
            if let Err(e) = write(&mut **store, payload) {
                warn!("Union {} of {} failed in member {}: {}", op, key, name, e);
                failures.push(format!("{name}: {e}"));
            }
        }
        gathered(op, key, failures)
    }
}

impl Union for StoreUnion {
    fn names(&self) -> Vec<String> {
        self.members.iter().map(|(name, _)| name.clone()).collect()
    }

    fn store(&self, name: &str) -> CoreResult<SharedStore> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, store)| store.clone())
            .ok_or_else(|| CoreError::not_found(name))
    }

    fn read(&self, key: &str) -> CoreResult<BTreeMap<String, Vec<u8>>> {
        let mut found = BTreeMap::new();
        let mut failures = Vec::new();
        for (name, store) in &self.members {
            match store.lock().read(key) {
                Ok(data) => {
                    found.insert(name.clone(), data);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!("Union read of {} failed in member {}: {}", key, name, e);
                    failures.push(format!("{name}: {e}"));
                }
            }
        }
        gathered("read", key, failures)?;
        non_empty(key, found)
    }

    fn length(&self, key: &str) -> CoreResult<BTreeMap<String, u64>> {
        let mut found = BTreeMap::new();
        let mut failures = Vec::new();
        for (name, store) in &self.members {
            match store.lock().length(key) {
                Ok(len) => {
                    found.insert(name.clone(), len);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!("Union length of {} failed in member {}: {}", key, name, e);
                    failures.push(format!("{name}: {e}"));
                }
            }
        }
        gathered("length", key, failures)?;
        non_empty(key, found)
    }

    fn insert(&self, key: &str, data: &BTreeMap<String, Vec<u8>>) -> CoreResult<()> {
        self.write_each("insert", key, data, |store, payload| store.insert(key, payload))
    }

    fn replace(&self, key: &str, data: &BTreeMap<String, Vec<u8>>) -> CoreResult<()> {
        self.write_each("replace", key, data, |store, payload| store.replace(key, payload))
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        let mut removed = 0usize;
        let mut failures = Vec::new();
        for (name, store) in &self.members {
            match store.lock().remove(key) {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!("Union remove of {} failed in member {}: {}", key, name, e);
                    failures.push(format!("{name}: {e}"));
                }
            }
        }
        gathered("remove", key, failures)?;
        if removed == 0 {
            return Err(CoreError::not_found(key));
        }
        Ok(())
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>) -> CoreResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(CoreError::strategy(format!("duplicate union member name: {name}")));
        }
    }
    Ok(())
}

fn gathered(op: &str, key: &str, failures: Vec<String>) -> CoreResult<()> {
    if failures.is_empty() {
        return Ok(());
    }
    Err(CoreError::strategy(format!(
        "{op} of {key} failed in {} member(s): {}",
        failures.len(),
        failures.join("; ")
    )))
}

fn non_empty<V>(key: &str, found: BTreeMap<String, V>) -> CoreResult<BTreeMap<String, V>> {
    if found.is_empty() {
        return Err(CoreError::not_found(key));
    }
    Ok(found)
}
