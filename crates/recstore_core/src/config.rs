//! Store configuration.

use crate::error::{CoreError, CoreResult};
use crate::types::StoreKind;

/// Tunables applied when a store is created or opened.
///
/// None of these are persisted; a store reopened with a different config
/// keeps its on-disk data and simply uses the new values from then on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Largest chunk a segmented store writes under a single map key.
    pub max_record_size: u64,

    /// zstd level used by compressed stores.
    pub compression_level: i32,

    /// Backend used for the two inner stores of a new compressed store.
    pub inner_kind: StoreKind,

    /// Whether to fsync data files after every mutation.
    pub sync_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_record_size: u64::from(u32::MAX),
            compression_level: 3,
            inner_kind: StoreKind::Segmented,
            sync_on_write: false,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segment size ceiling.
    #[must_use]
    pub const fn max_record_size(mut self, size: u64) -> Self {
        self.max_record_size = size;
        self
    }

    /// Sets the zstd compression level.
    #[must_use]
    pub const fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets the inner backend kind for compressed stores.
    #[must_use]
    pub const fn inner_kind(mut self, kind: StoreKind) -> Self {
        self.inner_kind = kind;
        self
    }

    /// Sets whether to fsync after every mutation.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Checks the values for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a parameter error for a zero segment size or an inner kind
    /// that cannot hold compressed payloads.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_record_size == 0 {
            return Err(CoreError::parameter("max_record_size must be positive"));
        }
        if matches!(self.inner_kind, StoreKind::Compressed | StoreKind::List) {
            return Err(CoreError::parameter(format!(
                "{} cannot back a compressed store",
                self.inner_kind
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.max_record_size, 4_294_967_295);
        assert_eq!(config.compression_level, 3);
        assert_eq!(config.inner_kind, StoreKind::Segmented);
        assert!(!config.sync_on_write);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .max_record_size(10)
            .compression_level(19)
            .inner_kind(StoreKind::Archive)
            .sync_on_write(true);

        assert_eq!(config.max_record_size, 10);
        assert_eq!(config.compression_level, 19);
        assert_eq!(config.inner_kind, StoreKind::Archive);
        assert!(config.sync_on_write);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(StoreConfig::new().max_record_size(0).validate().unwrap_err().is_parameter());
        assert!(StoreConfig::new()
            .inner_kind(StoreKind::List)
            .validate()
            .unwrap_err()
            .is_parameter());
        assert!(StoreConfig::new()
            .inner_kind(StoreKind::Compressed)
            .validate()
            .unwrap_err()
            .is_parameter());
        assert!(StoreConfig::new().inner_kind(StoreKind::File).validate().is_ok());
    }
}
