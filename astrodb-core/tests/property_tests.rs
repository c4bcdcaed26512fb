// Property-based tests using proptest
use astrodb_core::{AesGcmCipher, DocumentStore, EncryptionKey, StoreConfig};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn open_store(temp_dir: &TempDir, use_indexes: bool) -> DocumentStore {
    let config = StoreConfig::new()
        .path(temp_dir.path().join("prop.adb"))
        .use_indexes(use_indexes);
    DocumentStore::new(config, Arc::new(AesGcmCipher::new(&EncryptionKey::generate())))
}

fn field_values(docs: &[astrodb_core::Document], field: &str) -> Vec<Value> {
    docs.iter().map(|d| d.get(field).cloned().unwrap_or(Value::Null)).collect()
}

// ========== PROPERTY 1: Inserted ids are unique ==========

proptest! {
    #[test]
    fn prop_insert_ids_unique(count in 1usize..60) {
        let temp_dir = TempDir::new().unwrap();
        let db = open_store(&temp_dir, true);

        let docs = db.insert_many("items", (0..count).map(|i| json!({"i": i})).collect(), "owner").unwrap();
        let ids: HashSet<_> = docs.iter().map(|d| d.id().clone()).collect();

        prop_assert_eq!(ids.len(), count);
        prop_assert!(docs.iter().all(|d| d.owner_id() == "owner"));
    }
}

// ========== PROPERTY 2: Index and scan agree on unique values ==========

proptest! {
    #[test]
    fn prop_unique_index_matches_scan(
        codes in prop::collection::hash_set("[a-z]{1,6}", 1..25),
        lookups in prop::collection::vec("[a-z]{1,6}", 1..10),
        owners in prop::collection::vec(0u8..3, 25),
    ) {
        let dir_indexed = TempDir::new().unwrap();
        let dir_scan = TempDir::new().unwrap();
        let indexed = open_store(&dir_indexed, true);
        let scanning = open_store(&dir_scan, false);

        for db in [&indexed, &scanning] {
            db.create_index("codes", "code").unwrap();
        }
        for (i, code) in codes.iter().enumerate() {
            let owner = format!("o{}", owners[i % owners.len()]);
            for db in [&indexed, &scanning] {
                db.insert_one("codes", json!({"code": code, "i": i}), &owner).unwrap();
            }
        }

        for lookup in lookups.iter().chain(codes.iter()) {
            for owner in ["o0", "o1", "o2"] {
                let query = json!({"code": lookup});
                let a = indexed.find("codes", &query, owner).unwrap();
                let b = scanning.find("codes", &query, owner).unwrap();
                prop_assert_eq!(field_values(&a, "i"), field_values(&b, "i"));
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_float_query_index_matches_scan(base in (1i64 << 52)..(1i64 << 60), offset in 0i64..4) {
        let dir_indexed = TempDir::new().unwrap();
        let dir_scan = TempDir::new().unwrap();
        let indexed = open_store(&dir_indexed, true);
        let scanning = open_store(&dir_scan, false);

        let stored = base + offset;
        for db in [&indexed, &scanning] {
            db.create_index("nums", "n").unwrap();
            db.insert_one("nums", json!({"n": stored, "i": 0}), "o").unwrap();
        }

        // the float form may round to a neighbouring integer
        let query = json!({"n": base as f64});
        let a = indexed.find("nums", &query, "o").unwrap();
        let b = scanning.find("nums", &query, "o").unwrap();
        prop_assert_eq!(field_values(&a, "i"), field_values(&b, "i"));
    }
}

// ========== PROPERTY 3: Deletion preserves relative order ==========

proptest! {
    #[test]
    fn prop_delete_preserves_order(flags in prop::collection::vec(any::<bool>(), 1..40)) {
        let temp_dir = TempDir::new().unwrap();
        let db = open_store(&temp_dir, true);

        for (i, drop) in flags.iter().enumerate() {
            db.insert_one("seq", json!({"i": i, "drop": drop}), "o").unwrap();
        }

        let expected_deleted = flags.iter().filter(|f| **f).count();
        prop_assert_eq!(db.delete_many("seq", &json!({"drop": true}), "o").unwrap(), expected_deleted);

        let expected: Vec<Value> = flags
            .iter()
            .enumerate()
            .filter(|(_, drop)| !**drop)
            .map(|(i, _)| json!(i))
            .collect();
        let remaining = db.find("seq", &json!({}), "o").unwrap();
        prop_assert_eq!(field_values(&remaining, "i"), expected);
    }
}

// ========== PROPERTY 4: Save/load round trip ==========

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_save_load_roundtrip(values in prop::collection::vec((any::<i64>(), "[a-zA-Z0-9 ]{0,12}"), 0..20)) {
        let temp_dir = TempDir::new().unwrap();
        let key = EncryptionKey::generate();
        let config = StoreConfig::new().path(temp_dir.path().join("prop.adb"));

        let db = DocumentStore::new(config.clone(), Arc::new(AesGcmCipher::new(&key)));
        for (n, s) in &values {
            db.insert_one("data", json!({"n": n, "s": s}), "o").unwrap();
        }
        prop_assert!(db.save_to_disk().is_saved());

        let reopened = DocumentStore::open(config, Arc::new(AesGcmCipher::new(&key)));
        prop_assert_eq!(
            reopened.find("data", &json!({}), "o").unwrap(),
            db.find("data", &json!({}), "o").unwrap()
        );
    }
}
