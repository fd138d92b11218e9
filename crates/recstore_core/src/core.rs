//! Store directory and control file bookkeeping.
//!
//! Every store is a directory holding a control file plus whatever data
//! files its backend needs:
//!
//! ```text
//! <store>/
//! ├─ .rscontrol.prop   # Description, Count, Type and any extra properties
//! └─ ...               # backend files
//! ```
//!
//! `StoreCore` owns the control file. Backends call
//! [`record_insert`](StoreCore::record_insert) and
//! [`record_remove`](StoreCore::record_remove) only after their own data
//! write has succeeded, so the persisted count never runs ahead of the
//! readable records.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;
use crate::types::{Mode, StoreKind};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the control file inside every store directory.
pub const CONTROL_FILE: &str = ".rscontrol.prop";

/// Control property holding the free-form description.
pub const DESCRIPTION_PROPERTY: &str = "Description";
/// Control property holding the live record count.
pub const COUNT_PROPERTY: &str = "Count";
/// Control property holding the [`StoreKind`].
pub const TYPE_PROPERTY: &str = "Type";

/// Properties callers can never set through [`StoreCore::set_properties`].
pub const CORE_PROPERTIES: [&str; 3] = [DESCRIPTION_PROPERTY, COUNT_PROPERTY, TYPE_PROPERTY];

/// Separates a key from its segment number in generated segment names.
pub const KEY_SEGMENT_SEPARATOR: char = '&';

/// Characters that may not appear in a record key.
pub const INVALID_KEY_CHARS: [char; 4] = ['/', '\\', '*', KEY_SEGMENT_SEPARATOR];

/// Shared state of an open store: its directory, mode and control file.
#[derive(Debug)]
pub struct StoreCore {
    path: PathBuf,
    mode: Mode,
    kind: StoreKind,
    description: String,
    count: u64,
    properties: Properties,
    reserved: Vec<&'static str>,
    config: StoreConfig,
}

impl StoreCore {
    /// Creates a store directory and its initial control file.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if `path` exists, a parameter error for a
    /// multi-line description, or a strategy error on I/O failure.
    pub fn create(
        path: &Path,
        description: &str,
        kind: StoreKind,
        config: &StoreConfig,
    ) -> CoreResult<Self> {
        config.validate()?;
        if path.exists() {
            return Err(CoreError::object_exists(path.display().to_string()));
        }

        let mut properties = Properties::new();
        properties.set(DESCRIPTION_PROPERTY, description)?;
        properties.set(COUNT_PROPERTY, "0")?;
        properties.set(TYPE_PROPERTY, kind.as_str())?;

        fs::create_dir_all(path)?;
        properties.save(&path.join(CONTROL_FILE), config.sync_on_write)?;
        info!("Created {} store at {:?}", kind, path);

        Ok(Self {
            path: path.to_path_buf(),
            mode: Mode::ReadWrite,
            kind,
            description: description.trim().to_owned(),
            count: 0,
            properties,
            reserved: Vec::new(),
            config: config.clone(),
        })
    }

    /// Opens the control file of an existing store.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDoesNotExist` if `path` is missing, or a strategy
    /// error if the control file is missing, malformed, or lacks a core
    /// property.
    pub fn open(path: &Path, mode: Mode, config: &StoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let properties = Self::read_control(path)?;

        let description = required(&properties, DESCRIPTION_PROPERTY, path)?.to_owned();
        let count = required(&properties, COUNT_PROPERTY, path)?
            .parse::<u64>()
            .map_err(|e| {
                CoreError::strategy(format!("bad Count in {}: {e}", path.display()))
            })?;
        let kind = required(&properties, TYPE_PROPERTY, path)?.parse::<StoreKind>()?;
        debug!("Opened {} store at {:?} ({:?})", kind, path, mode);

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            kind,
            description,
            count,
            properties,
            reserved: Vec::new(),
            config: config.clone(),
        })
    }

    /// Reads the `Type` property of the store at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn read_kind(path: &Path) -> CoreResult<StoreKind> {
        let properties = Self::read_control(path)?;
        required(&properties, TYPE_PROPERTY, path)?.parse()
    }

    fn read_control(path: &Path) -> CoreResult<Properties> {
        if !path.exists() {
            return Err(CoreError::not_found(path.display().to_string()));
        }
        let control = path.join(CONTROL_FILE);
        if !control.is_file() {
            return Err(CoreError::strategy(format!(
                "{} has no control file",
                path.display()
            )));
        }
        Properties::load(&control)
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the access mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the number of live records.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Fails with a strategy error if the store is read-only.
    ///
    /// # Errors
    ///
    /// Returns a strategy error naming the store on a read-only handle.
    pub fn ensure_writable(&self) -> CoreResult<()> {
        if self.mode.is_read_only() {
            return Err(CoreError::strategy(format!(
                "{} is open read-only",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Replaces the description.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on a read-only store or I/O failure, or a
    /// parameter error for a multi-line description.
    pub fn change_description(&mut self, description: &str) -> CoreResult<()> {
        self.ensure_writable()?;
        self.properties.set(DESCRIPTION_PROPERTY, description)?;
        self.description = description.trim().to_owned();
        self.save()
    }

    /// Returns every property that is not a core property.
    #[must_use]
    pub fn properties(&self) -> Properties {
        let mut out = self.properties.clone();
        for name in CORE_PROPERTIES {
            out.remove(name);
        }
        out
    }

    /// Replaces all non-core, non-reserved properties with `props`.
    ///
    /// Core properties and properties reserved by the backend are ignored
    /// on import and keep their current values.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on a read-only store or I/O failure.
    pub fn set_properties(&mut self, props: &Properties) -> CoreResult<()> {
        self.ensure_writable()?;
        let mut next = Properties::new();
        for (name, value) in &self.properties {
            if self.is_protected(name) {
                next.set(name, value)?;
            }
        }
        for (name, value) in props {
            if !self.is_protected(name) {
                next.set(name, value)?;
            }
        }
        self.properties = next;
        self.save()
    }

    fn is_protected(&self, name: &str) -> bool {
        CORE_PROPERTIES.contains(&name) || self.reserved.contains(&name)
    }

    /// Marks `name` as owned by the backend so callers cannot change it.
    pub(crate) fn reserve_property(&mut self, name: &'static str) {
        if !self.reserved.contains(&name) {
            self.reserved.push(name);
        }
    }

    /// Returns the value of a backend-owned property.
    pub(crate) fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name)
    }

    /// Sets a backend-owned property and persists it.
    pub(crate) fn set_property(&mut self, name: &str, value: &str) -> CoreResult<()> {
        self.properties.set(name, value)?;
        self.save()
    }

    /// Bumps the count after a successful insert.
    pub(crate) fn record_insert(&mut self) -> CoreResult<()> {
        self.count += 1;
        self.store_count()
    }

    /// Drops the count after a successful remove.
    pub(crate) fn record_remove(&mut self) -> CoreResult<()> {
        self.count = self.count.checked_sub(1).ok_or_else(|| {
            CoreError::strategy(format!(
                "count underflow in {}",
                self.path.display()
            ))
        })?;
        self.store_count()
    }

    /// Overwrites the count, used after a store is rebuilt.
    pub(crate) fn reset_count(&mut self, count: u64) -> CoreResult<()> {
        self.count = count;
        self.store_count()
    }

    fn store_count(&mut self) -> CoreResult<()> {
        self.properties.set(COUNT_PROPERTY, self.count.to_string())?;
        self.save()
    }

    fn save(&self) -> CoreResult<()> {
        self.properties
            .save(&self.control_path(), self.config.sync_on_write)
    }

    /// Persists the control file durably. A no-op on read-only stores.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on I/O failure.
    pub fn sync(&self) -> CoreResult<()> {
        if self.mode.is_read_only() {
            return Ok(());
        }
        self.properties.save(&self.control_path(), true)
    }

    /// Renames the store directory to `new_path`.
    ///
    /// The caller must have closed every data file inside the directory.
    ///
    /// # Errors
    ///
    /// Returns a strategy error on a read-only store or I/O failure, and
    /// `ObjectExists` if `new_path` exists.
    pub fn move_to(&mut self, new_path: &Path) -> CoreResult<()> {
        self.ensure_writable()?;
        if new_path.exists() {
            return Err(CoreError::object_exists(new_path.display().to_string()));
        }
        self.sync()?;
        fs::rename(&self.path, new_path)?;
        info!("Moved store {:?} to {:?}", self.path, new_path);
        self.path = new_path.to_path_buf();
        Ok(())
    }

    /// Returns the path of the control file.
    #[must_use]
    pub fn control_path(&self) -> PathBuf {
        self.path.join(CONTROL_FILE)
    }

    /// Returns the size of the control file in bytes.
    ///
    /// # Errors
    ///
    /// Returns a strategy error if the file cannot be inspected.
    pub fn space_used(&self) -> CoreResult<u64> {
        file_size(&self.control_path())
    }

    /// Checks that `key` may be stored.
    ///
    /// # Errors
    ///
    /// Returns a parameter error for an empty key, a key with leading
    /// whitespace, or a key containing `/`, `\`, `*`, `&` or a line break.
    pub fn validate_key(key: &str) -> CoreResult<()> {
        if key.is_empty() {
            return Err(CoreError::parameter("empty key"));
        }
        if key.starts_with(char::is_whitespace) {
            return Err(CoreError::parameter(format!(
                "key {key:?} starts with whitespace"
            )));
        }
        if let Some(c) = key
            .chars()
            .find(|c| INVALID_KEY_CHARS.contains(c) || matches!(c, '\n' | '\r'))
        {
            return Err(CoreError::parameter(format!(
                "key {key:?} contains {c:?}"
            )));
        }
        Ok(())
    }

    /// Returns the map key of segment `segment` of `key`.
    ///
    /// Segment 0 is the key itself.
    #[must_use]
    pub fn gen_segment_key_name(key: &str, segment: u64) -> String {
        if segment == 0 {
            key.to_owned()
        } else {
            format!("{key}{KEY_SEGMENT_SEPARATOR}{segment}")
        }
    }
}

fn required<'a>(properties: &'a Properties, name: &str, path: &Path) -> CoreResult<&'a str> {
    properties.get(name).ok_or_else(|| {
        CoreError::strategy(format!(
            "control file of {} lacks {name}",
            path.display()
        ))
    })
}

/// Returns the size of a file, or 0 if it does not exist.
pub(crate) fn file_size(path: &Path) -> CoreResult<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}
