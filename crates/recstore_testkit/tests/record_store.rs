//! Behaviour shared by every writable store kind.

use proptest::prelude::*;
use recstore_core::{
    ArchiveStore, Cursor, Mode, Properties, RecordStore, Records, StoreConfig, StoreKind,
    CONTROL_FILE,
};
use recstore_testkit::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const WRITABLE: [StoreKind; 4] = [
    StoreKind::Archive,
    StoreKind::Segmented,
    StoreKind::Compressed,
    StoreKind::File,
];

fn keys_in_sequence(store: &mut dyn RecordStore) -> Vec<String> {
    Records::new(store).map(|r| r.unwrap().key).collect()
}

fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(snapshot(&path));
        } else {
            files.insert(path.display().to_string(), fs::read(&path).unwrap());
        }
    }
    files
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn round_trip(kind in writable_kind_strategy(), records in records_strategy(12)) {
        let mut store = TestStore::new(kind);
        for (key, data) in &records {
            store.insert(key, data).unwrap();
        }

        prop_assert_eq!(store.count(), records.len() as u64);
        for (key, data) in &records {
            prop_assert_eq!(&store.read(key).unwrap(), data);
            prop_assert_eq!(store.length(key).unwrap(), data.len() as u64);
            prop_assert!(store.contains_key(key).unwrap());
        }

        let mut sequenced = keys_in_sequence(store.store.as_mut());
        sequenced.sort();
        let expected: Vec<String> = records.keys().cloned().collect();
        prop_assert_eq!(sequenced, expected);
    }

    #[test]
    fn malformed_keys_are_rejected(kind in writable_kind_strategy(), key in invalid_key_strategy()) {
        let mut store = TestStore::new(kind);
        prop_assert!(store.insert(&key, b"data").unwrap_err().is_parameter());
        prop_assert_eq!(store.count(), 0);
    }
}

#[test]
fn duplicate_insert_leaves_store_unchanged() {
    for kind in WRITABLE {
        let mut store = scenarios::populated(kind, 3);
        let err = store.insert("key0001", b"other").unwrap_err();
        assert!(err.is_exists(), "{kind}: {err}");
        assert_eq!(store.count(), 3);
        assert_eq!(store.read("key0001").unwrap(), payload_for("key0001"));
    }
}

#[test]
fn missing_keys_are_not_found() {
    for kind in WRITABLE {
        let mut store = TestStore::new(kind);
        assert!(store.read("nope").unwrap_err().is_not_found());
        assert!(store.length("nope").unwrap_err().is_not_found());
        assert!(store.remove("nope").unwrap_err().is_not_found());
        assert!(store.replace("nope", b"x").unwrap_err().is_not_found());
        assert!(store.flush("nope").unwrap_err().is_not_found());
        assert!(store.set_cursor_at_key("nope").unwrap_err().is_not_found());
        assert!(!store.contains_key("nope").unwrap());
        assert!(store.sequence(Cursor::Start).unwrap_err().is_not_found());
    }
}

#[test]
fn replace_swaps_payload() {
    for kind in WRITABLE {
        let mut store = scenarios::populated(kind, 2);
        store.replace("key0000", b"replacement").unwrap();
        assert_eq!(store.read("key0000").unwrap(), b"replacement");
        assert_eq!(store.count(), 2);
    }
}

#[test]
fn cursor_restarts_and_lands() {
    for kind in WRITABLE {
        let mut store = scenarios::populated(kind, 5);
        store.set_cursor_at_key("key0002").unwrap();
        assert_eq!(store.sequence_key(Cursor::Next).unwrap(), "key0002");
        assert_eq!(store.sequence_key(Cursor::Next).unwrap(), "key0003");
        assert_eq!(store.sequence_key(Cursor::Start).unwrap(), "key0000");
        assert_eq!(keys_in_sequence(store.store.as_mut()), scenarios::keys(5));
    }
}

#[test]
fn state_survives_reopen() {
    for kind in WRITABLE {
        let mut store = scenarios::populated(kind, 4);
        store.remove("key0001").unwrap();
        store.change_description("renamed").unwrap();
        let mut props = Properties::new();
        props.set("Owner", "tests").unwrap();
        store.set_properties(&props).unwrap();
        store.sync().unwrap();

        let store = store.reopen(Mode::ReadWrite);
        assert_eq!(store.count(), 3);
        assert_eq!(store.description(), "renamed");
        assert_eq!(store.properties().get("Owner"), Some("tests"));
        assert!(!store.contains_key("key0001").unwrap());
        assert_eq!(store.read("key0003").unwrap(), payload_for("key0003"));
    }
}

#[test]
fn vacuum_reclaims_tombstones() {
    let (n, m) = (20, 7);
    let dir = tempfile::tempdir().unwrap();
    let mut store = ArchiveStore::create(&dir.path().join("archive"), "vacuum").unwrap();
    let keys = scenarios::keys(n);
    for key in &keys {
        store.insert(key, &[0xAB; 256]).unwrap();
    }
    for key in &keys[..m] {
        store.remove(key).unwrap();
    }
    assert!(store.needs_vacuum());
    let before = store.space_used().unwrap();

    store.vacuum().unwrap();

    assert_eq!(store.count(), (n - m) as u64);
    assert!(store.space_used().unwrap() <= before);
    assert!(!store.needs_vacuum());
    for key in &keys[m..] {
        assert_eq!(store.read(key).unwrap(), vec![0xAB; 256]);
    }
    for key in &keys[..m] {
        assert!(!store.contains_key(key).unwrap());
    }
}

#[test]
fn oversized_record_is_segmented() {
    let config = StoreConfig::new().max_record_size(10);
    let mut store = TestStore::with_config(StoreKind::Segmented, &config);
    let data: Vec<u8> = (0..25).collect();

    store.insert("A", &data).unwrap();
    assert_eq!(store.read("A").unwrap(), data);
    assert_eq!(store.length("A").unwrap(), 25);
    assert_eq!(keys_in_sequence(store.store.as_mut()), ["A"]);

    let store = store.reopen(Mode::ReadOnly);
    assert_eq!(store.read("A").unwrap(), data);
    assert_eq!(store.count(), 1);
}

#[test]
fn compressed_length_is_uncompressed_size() {
    let mut store = TestStore::new(StoreKind::Compressed);
    let data = vec![b'z'; 50_000];
    store.insert("big", &data).unwrap();
    assert_eq!(store.length("big").unwrap(), 50_000);
    assert_eq!(store.read("big").unwrap(), data);
}

#[test]
fn read_only_stores_reject_every_mutator() {
    for kind in WRITABLE {
        let store = scenarios::populated(kind, 2).reopen(Mode::ReadOnly);
        let before = snapshot(store.dir());
        let elsewhere = store.dir().join("moved");
        let mut store = store;

        let results = [
            store.insert("new", b"x"),
            store.remove("key0000"),
            store.replace("key0000", b"x"),
            store.flush("key0000"),
            store.change_description("x"),
            store.set_properties(&Properties::new()),
            store.move_to(&elsewhere),
        ];
        for result in results {
            assert!(result.unwrap_err().is_strategy(), "{kind}");
        }
        store.sync().unwrap();
        assert_eq!(store.count(), 2);

        let dir = store.dir().to_path_buf();
        let path = store.path().to_path_buf();
        let after = snapshot(&dir);
        let control = path.join(CONTROL_FILE).display().to_string();
        assert_eq!(before[&control], after[&control], "{kind}");
        if matches!(kind, StoreKind::Archive | StoreKind::File) {
            assert_eq!(before, after);
        }
        drop(store);
    }
}

#[test]
fn move_relocates_store() {
    for kind in WRITABLE {
        let mut store = scenarios::populated(kind, 3);
        let new_path = store.dir().join("relocated");
        store.move_to(&new_path).unwrap();
        assert_eq!(store.store.path(), new_path.as_path());
        assert!(!store.path().exists());
        store.insert("after", b"move").unwrap();
        assert_eq!(store.read("key0002").unwrap(), payload_for("key0002"));
    }
}
