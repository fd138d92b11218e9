//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, payloads and record sets that every
//! store kind accepts.

use proptest::prelude::*;
use recstore_core::StoreKind;
use std::collections::BTreeMap;

/// Strategy for generating valid record keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9_.:-]{0,23}").expect("Invalid regex")
}

/// Strategy for generating keys that every store rejects.
pub fn invalid_key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[ \t][a-z]{1,8}",
        "[a-z]{0,4}[/\\\\*&][a-z]{0,4}",
    ]
}

/// Strategy for generating payloads, empty ones included.
pub fn data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Strategy for generating a set of records with distinct keys.
pub fn records_strategy(max: usize) -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(key_strategy(), data_strategy(), 1..=max.max(1))
}

/// Strategy for the store kinds that can be created empty and written.
pub fn writable_kind_strategy() -> impl Strategy<Value = StoreKind> {
    prop_oneof![
        Just(StoreKind::Archive),
        Just(StoreKind::Segmented),
        Just(StoreKind::Compressed),
        Just(StoreKind::File),
    ]
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 64,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests. Store-backed properties
    /// touch the filesystem, so this is the usual choice.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests of properties that
    /// never touch the filesystem.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 512,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recstore_core::StoreCore;

    proptest! {
        #![proptest_config(PropTestConfig::thorough().to_proptest_config())]

        #[test]
        fn generated_keys_are_valid(key in key_strategy()) {
            prop_assert!(StoreCore::validate_key(&key).is_ok());
        }
    }

    proptest! {
        #![proptest_config(PropTestConfig::default().to_proptest_config())]

        #[test]
        fn invalid_keys_are_rejected(key in invalid_key_strategy()) {
            let err = StoreCore::validate_key(&key).unwrap_err();
            prop_assert!(err.is_parameter());
        }

        #[test]
        fn record_sets_are_bounded(records in records_strategy(8)) {
            prop_assert!(!records.is_empty());
            prop_assert!(records.len() <= 8);
        }
    }
}
