// src/document.rs
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

use crate::error::{AstroDbError, Result};

/// Store-assigned identifier field
pub const ID_FIELD: &str = "_id";
/// Tenant that inserted the document
pub const OWNER_FIELD: &str = "owner_id";

/// Document identifier, unique within a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// New ObjectId-style identifier (UUID v4)
    pub fn new_object_id() -> Self {
        DocumentId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        DocumentId(s)
    }
}

impl Borrow<str> for DocumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored JSON document.
///
/// The field map always carries `_id` and `owner_id` as strings. Both are fixed
/// for the lifetime of the document: `set` and `remove` refuse to touch them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Document {
    id: DocumentId,
    owner_id: String,
    fields: Map<String, Value>,
}

impl Document {
    /// Stamp caller fields with the system fields, overwriting whatever the
    /// payload carried under those names.
    pub(crate) fn stamp(mut fields: Map<String, Value>, id: DocumentId, owner_id: &str) -> Self {
        fields.insert(ID_FIELD.to_string(), Value::String(id.as_str().to_string()));
        fields.insert(OWNER_FIELD.to_string(), Value::String(owner_id.to_string()));
        Document {
            id,
            owner_id: owner_id.to_string(),
            fields,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    /// Field lookup, dot-separated paths descend into nested objects
    pub fn get(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.fields, path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set a top-level field. Returns false (and changes nothing) for system fields.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> bool {
        let field = field.into();
        if is_system_field(&field) {
            return false;
        }
        self.fields.insert(field, value);
        true
    }

    /// Remove a top-level field. System fields are never removed.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        if is_system_field(field) {
            return None;
        }
        self.fields.remove(field)
    }

    /// Full field map, system fields included
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl TryFrom<Map<String, Value>> for Document {
    type Error = AstroDbError;

    fn try_from(fields: Map<String, Value>) -> Result<Self> {
        let id = match fields.get(ID_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => DocumentId(s.clone()),
            _ => return Err(AstroDbError::Corruption("document without string _id".into())),
        };
        let owner_id = match fields.get(OWNER_FIELD) {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(AstroDbError::Corruption(format!("document {} without string owner_id", id))),
        };
        Ok(Document { id, owner_id, fields })
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.fields)
    }
}

pub fn is_system_field(field: &str) -> bool {
    field == ID_FIELD || field == OWNER_FIELD
}

/// Resolve a dot-separated path. Any missing segment, or a non-object where
/// further descent is needed, yields `None`.
pub fn resolve_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Structural equality where numbers compare by value (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).map_or(false, |y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        (Some(x), None) => int_equals(x, b),
        (None, Some(y)) => int_equals(y, a),
        // u64 above i64::MAX, or floats
        (None, None) => match (a.as_u64(), b.as_u64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
    }
}

// Exact: an i64 only equals a float that is integral and converts back to it
fn int_equals(int: i64, other: &Number) -> bool {
    if other.is_u64() {
        return false;
    }
    other.as_f64().and_then(integral_i64) == Some(int)
}

/// `f` as an i64 when it is integral and within i64 range
pub(crate) fn integral_i64(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_document_id_object_id() {
        let id = DocumentId::new_object_id();

        // UUID v4 format: 8-4-4-4-12 characters
        assert_eq!(id.as_str().len(), 36);
        assert!(id.as_str().contains('-'));
        assert_ne!(id, DocumentId::new_object_id());
    }

    #[test]
    fn test_stamp_overwrites_system_fields() {
        let doc = Document::stamp(
            fields(json!({"name": "Alice", "_id": "forged", "owner_id": "mallory"})),
            DocumentId::from("abc"),
            "alice",
        );

        assert_eq!(doc.id().as_str(), "abc");
        assert_eq!(doc.owner_id(), "alice");
        assert_eq!(doc.get("_id").unwrap(), &json!("abc"));
        assert_eq!(doc.get("owner_id").unwrap(), &json!("alice"));
        assert_eq!(doc.get("name").unwrap(), &json!("Alice"));
    }

    #[test]
    fn test_set_refuses_system_fields() {
        let mut doc = Document::stamp(fields(json!({"count": 1})), DocumentId::from("1"), "u");

        assert!(!doc.set("_id", json!("other")));
        assert!(!doc.set("owner_id", json!("other")));
        assert!(doc.set("count", json!(2)));

        assert_eq!(doc.id().as_str(), "1");
        assert_eq!(doc.owner_id(), "u");
        assert_eq!(doc.get("count").unwrap(), &json!(2));
    }

    #[test]
    fn test_remove_field() {
        let mut doc = Document::stamp(fields(json!({"temp": "x", "keep": "y"})), DocumentId::from("1"), "u");

        assert_eq!(doc.remove("temp"), Some(json!("x")));
        assert_eq!(doc.remove("temp"), None);
        assert_eq!(doc.remove("_id"), None);
        assert!(doc.contains("keep"));
        assert!(doc.contains("_id"));
    }

    #[test]
    fn test_nested_path_resolution() {
        let doc = Document::stamp(
            fields(json!({"user": {"profile": {"name": "Helen"}, "tags": ["a"]}, "flat": 3})),
            DocumentId::from("1"),
            "u",
        );

        assert_eq!(doc.get("user.profile.name").unwrap(), &json!("Helen"));
        assert!(doc.get("user.profile.email").is_none());
        // descending through a non-object is absent
        assert!(doc.get("flat.inner").is_none());
        assert!(doc.get("user.tags.0").is_none());
    }

    #[test]
    fn test_roundtrip_serialization() {
        let original = Document::stamp(
            fields(json!({"name": "Grace", "tags": ["rust", "database"], "meta": {"v": 1}})),
            DocumentId::from("doc-1"),
            "grace",
        );

        let json_str = original.to_json().unwrap();
        let parsed: Value = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed["_id"], "doc-1");
        assert_eq!(parsed["owner_id"], "grace");

        let restored = Document::from_json(&json_str).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_deserialize_rejects_missing_system_fields() {
        assert!(Document::from_json(r#"{"name": "x"}"#).is_err());
        assert!(Document::from_json(r#"{"_id": 42, "owner_id": "u"}"#).is_err());
        assert!(Document::from_json(r#"{"_id": "a", "owner_id": 7}"#).is_err());
    }

    #[test]
    fn test_values_equal_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!([1, 2.0]), &json!([1.0, 2])));
        assert!(values_equal(&json!({"a": 1}), &json!({"a": 1.0})));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_values_equal_large_integers_are_exact() {
        // 2^53 + 1 has no exact f64 representation
        assert!(!values_equal(&json!(9007199254740993i64), &json!(9007199254740992.0)));
        assert!(values_equal(&json!(9007199254740992i64), &json!(9007199254740992.0)));
        assert!(!values_equal(&json!(i64::MAX), &json!(9223372036854775808u64)));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!values_equal(&json!(3), &json!(3.5)));
    }

    #[test]
    fn test_document_to_value_conversion() {
        let doc = Document::stamp(fields(json!({"key": "value"})), DocumentId::from("7"), "u");

        let value: Value = doc.into();

        let obj = value.as_object().unwrap();
        assert_eq!(obj.get("_id").unwrap(), &json!("7"));
        assert_eq!(obj.get("key").unwrap(), &json!("value"));
    }
}
