// src/index.rs
// Single-field point indexes

use ahash::AHashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::document::{integral_i64, Document, DocumentId};

/// Index key - the value types a point index can hold
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Bool(bool),
    Int(i64),
    Float(FloatKey),
    String(String),
}

/// f64 wrapper compared and hashed by bit pattern
#[derive(Debug, Clone, Copy)]
pub struct FloatKey(pub f64);

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatKey {}

impl Hash for FloatKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl IndexKey {
    /// Key for a scalar value. Null, arrays and objects have no key.
    ///
    /// Integral floats collapse to `Int` so that `3` and `3.0` share an entry,
    /// matching the evaluator's numeric equality.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::String(s) => Some(IndexKey::String(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(IndexKey::Int(i));
                }
                let f = n.as_f64()?;
                match integral_i64(f) {
                    Some(i) => Some(IndexKey::Int(i)),
                    None => Some(IndexKey::Float(FloatKey(f))),
                }
            }
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Keys a document value contributes: arrays contribute each scalar element
    pub fn keys_for(value: Option<&Value>) -> Vec<IndexKey> {
        match value {
            Some(Value::Array(items)) => {
                let mut keys: Vec<IndexKey> = Vec::with_capacity(items.len());
                for key in items.iter().filter_map(IndexKey::from_value) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                keys
            }
            Some(value) => IndexKey::from_value(value).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

/// value -> document mapping for one field.
///
/// A later document carrying an already-indexed value takes over the entry, so
/// a lookup finds at most one document per value.
#[derive(Debug, Clone)]
pub struct FieldIndex {
    field: String,
    entries: AHashMap<IndexKey, DocumentId>,
}

impl FieldIndex {
    pub fn new(field: impl Into<String>) -> Self {
        FieldIndex {
            field: field.into(),
            entries: AHashMap::new(),
        }
    }

    pub fn get(&self, key: &IndexKey) -> Option<&DocumentId> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert_document(&mut self, doc: &Document) {
        for key in IndexKey::keys_for(doc.get(&self.field)) {
            self.entries.insert(key, doc.id().clone());
        }
    }

    pub fn remove_document(&mut self, doc: &Document) {
        for key in IndexKey::keys_for(doc.get(&self.field)) {
            self.remove_if_points_to(&key, doc.id());
        }
    }

    /// Incremental maintenance for an in-place update of `old` into `new`
    pub fn update_document(&mut self, old: &Document, new: &Document) {
        let (before, after) = (old.get(&self.field), new.get(&self.field));
        if before == after {
            return;
        }
        for key in IndexKey::keys_for(before) {
            self.remove_if_points_to(&key, old.id());
        }
        for key in IndexKey::keys_for(after) {
            self.entries.insert(key, new.id().clone());
        }
    }

    // Skip entries a later duplicate has already taken over
    fn remove_if_points_to(&mut self, key: &IndexKey, id: &DocumentId) {
        if self.entries.get(key) == Some(id) {
            self.entries.remove(key);
        }
    }
}

/// Index Manager - all secondary indexes of one collection, keyed by field.
/// `_id` is indexed implicitly by the collection itself and never appears here.
#[derive(Debug, Clone, Default)]
pub struct IndexManager {
    indexes: BTreeMap<String, FieldIndex>,
}

impl IndexManager {
    pub fn new() -> Self {
        IndexManager {
            indexes: BTreeMap::new(),
        }
    }

    /// Build (or rebuild from scratch) the index on `field`.
    /// Returns the number of distinct keys indexed.
    pub fn create_index<'a>(&mut self, field: &str, documents: impl IntoIterator<Item = &'a Document>) -> usize {
        let mut index = FieldIndex::new(field);
        for doc in documents {
            index.insert_document(doc);
        }
        let size = index.len();
        self.indexes.insert(field.to_string(), index);
        size
    }

    pub fn get(&self, field: &str) -> Option<&FieldIndex> {
        self.indexes.get(field)
    }

    /// Indexed field names, sorted
    pub fn fields(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub fn insert_document(&mut self, doc: &Document) {
        for index in self.indexes.values_mut() {
            index.insert_document(doc);
        }
    }

    pub fn update_document(&mut self, old: &Document, new: &Document) {
        for index in self.indexes.values_mut() {
            index.update_document(old, new);
        }
    }

    pub fn remove_document(&mut self, doc: &Document) {
        for index in self.indexes.values_mut() {
            index.remove_document(doc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn make_doc(id: &str, value: Value) -> Document {
        let fields: Map<String, Value> = match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        };
        Document::stamp(fields, DocumentId::from(id), "owner")
    }

    fn key(s: &str) -> IndexKey {
        IndexKey::String(s.to_string())
    }

    #[test]
    fn test_index_key_from_value() {
        assert_eq!(IndexKey::from_value(&json!(3)), Some(IndexKey::Int(3)));
        assert_eq!(IndexKey::from_value(&json!(3.0)), Some(IndexKey::Int(3)));
        assert_eq!(IndexKey::from_value(&json!(2.5)), Some(IndexKey::Float(FloatKey(2.5))));
        assert_eq!(IndexKey::from_value(&json!("a")), Some(key("a")));
        assert_eq!(IndexKey::from_value(&json!(true)), Some(IndexKey::Bool(true)));
        assert_eq!(IndexKey::from_value(&Value::Null), None);
        assert_eq!(IndexKey::from_value(&json!([1])), None);
        assert_eq!(IndexKey::from_value(&json!({"a": 1})), None);
    }

    #[test]
    fn test_keys_for_array_elements() {
        let keys = IndexKey::keys_for(Some(&json!(["a", "b", "a", null, [1]])));
        assert_eq!(keys, vec![key("a"), key("b")]);
        assert!(IndexKey::keys_for(None).is_empty());
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut index = FieldIndex::new("email");
        index.insert_document(&make_doc("1", json!({"email": "a@x.io"})));
        index.insert_document(&make_doc("2", json!({"email": "b@x.io"})));
        index.insert_document(&make_doc("3", json!({"name": "no email"})));

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&key("a@x.io")).unwrap().as_str(), "1");
        assert_eq!(index.get(&key("b@x.io")).unwrap().as_str(), "2");
        assert!(index.get(&key("c@x.io")).is_none());
    }

    #[test]
    fn test_duplicate_value_overwrites_entry() {
        let mut index = FieldIndex::new("city");
        let first = make_doc("1", json!({"city": "Tokyo"}));
        let second = make_doc("2", json!({"city": "Tokyo"}));
        index.insert_document(&first);
        index.insert_document(&second);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&key("Tokyo")).unwrap().as_str(), "2");

        // removing the overwritten document leaves the newer entry alone
        index.remove_document(&first);
        assert_eq!(index.get(&key("Tokyo")).unwrap().as_str(), "2");

        index.remove_document(&second);
        assert!(index.is_empty());
    }

    #[test]
    fn test_update_moves_entry() {
        let mut index = FieldIndex::new("status");
        let old = make_doc("1", json!({"status": "open"}));
        index.insert_document(&old);

        let new = make_doc("1", json!({"status": "done"}));
        index.update_document(&old, &new);

        assert!(index.get(&key("open")).is_none());
        assert_eq!(index.get(&key("done")).unwrap().as_str(), "1");

        // new value null: stale entry removed, nothing inserted
        let cleared = make_doc("1", json!({"status": null}));
        index.update_document(&new, &cleared);
        assert!(index.is_empty());
    }

    #[test]
    fn test_update_does_not_steal_overwritten_entry() {
        let mut index = FieldIndex::new("tag");
        let a = make_doc("a", json!({"tag": "x"}));
        let b = make_doc("b", json!({"tag": "x"}));
        index.insert_document(&a);
        index.insert_document(&b);

        let a2 = make_doc("a", json!({"tag": "y"}));
        index.update_document(&a, &a2);

        assert_eq!(index.get(&key("x")).unwrap().as_str(), "b");
        assert_eq!(index.get(&key("y")).unwrap().as_str(), "a");
    }

    #[test]
    fn test_manager_create_index_is_idempotent() {
        let docs = vec![
            make_doc("1", json!({"age": 30})),
            make_doc("2", json!({"age": 25})),
        ];
        let mut manager = IndexManager::new();

        assert_eq!(manager.create_index("age", &docs), 2);
        let first: Vec<_> = [30, 25]
            .iter()
            .map(|v| manager.get("age").unwrap().get(&IndexKey::Int(*v)).cloned())
            .collect();

        assert_eq!(manager.create_index("age", &docs), 2);
        let second: Vec<_> = [30, 25]
            .iter()
            .map(|v| manager.get("age").unwrap().get(&IndexKey::Int(*v)).cloned())
            .collect();

        assert_eq!(first, second);
        assert_eq!(manager.fields(), vec!["age".to_string()]);
    }

    #[test]
    fn test_manager_maintains_every_index() {
        let mut manager = IndexManager::new();
        manager.create_index("a", std::iter::empty());
        manager.create_index("b", std::iter::empty());

        let doc = make_doc("1", json!({"a": 1, "b": "two"}));
        manager.insert_document(&doc);
        assert_eq!(manager.get("a").unwrap().len(), 1);
        assert_eq!(manager.get("b").unwrap().len(), 1);

        manager.remove_document(&doc);
        assert!(manager.get("a").unwrap().is_empty());
        assert!(manager.get("b").unwrap().is_empty());

    }
}
