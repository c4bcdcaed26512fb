// src/collection_core.rs
// In-memory collection: ordered documents plus their secondary indexes

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::document::{Document, DocumentId, ID_FIELD};
use crate::error::{AstroDbError, Result};
use crate::index::IndexManager;
use crate::query::{json_type, Query};
use crate::query_planner::{QueryPlan, QueryPlanner};

/// One named collection.
///
/// `documents` keeps insertion order and doubles as the implicit `_id` index;
/// removal shifts later entries down without reordering them.
#[derive(Debug, Clone)]
pub(crate) struct CollectionCore {
    name: String,
    documents: IndexMap<DocumentId, Document>,
    indexes: IndexManager,
}

impl CollectionCore {
    pub fn new(name: &str) -> Self {
        CollectionCore {
            name: name.to_string(),
            documents: IndexMap::new(),
            indexes: IndexManager::new(),
        }
    }

    /// Rebuild a collection from persisted documents and index definitions
    pub fn restore(name: &str, documents: Vec<Document>, index_fields: &[String]) -> Self {
        let mut collection = Self::new(name);
        for doc in documents {
            if collection.documents.contains_key(doc.id()) {
                warn!(collection = name, id = %doc.id(), "duplicate _id in persisted data, keeping first");
                continue;
            }
            collection.documents.insert(doc.id().clone(), doc);
        }
        for field in index_fields {
            collection.create_index(field);
        }
        collection
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn index_fields(&self) -> Vec<String> {
        self.indexes.fields()
    }

    /// Stamp a fresh `_id` and the owner onto `fields`, append, index
    pub fn insert(&mut self, fields: Map<String, Value>, owner_id: &str) -> Document {
        let mut id = DocumentId::new_object_id();
        while self.documents.contains_key(&id) {
            id = DocumentId::new_object_id();
        }

        let doc = Document::stamp(fields, id.clone(), owner_id);
        self.indexes.insert_document(&doc);
        self.documents.insert(id, doc.clone());
        doc
    }

    /// (Re)build the index on `field`. `_id` is always indexed, so it is a no-op.
    pub fn create_index(&mut self, field: &str) -> usize {
        if field == ID_FIELD {
            return self.documents.len();
        }
        let keys = self.indexes.create_index(field, self.documents.values());
        debug!(collection = %self.name, field, keys, "index built");
        keys
    }

    pub fn plan(&self, query: &Query, use_indexes: bool) -> QueryPlan {
        if use_indexes {
            QueryPlanner::plan(query, &self.indexes)
        } else {
            QueryPlan::CollectionScan
        }
    }

    /// Storage positions of documents owned by `owner_id` matching `query`,
    /// ascending. An index hit is re-checked against the whole query.
    pub fn positions(&self, query: &Query, owner_id: &str, plan: &QueryPlan, first_only: bool) -> Vec<usize> {
        let is_match = |doc: &Document| doc.is_owned_by(owner_id) && query.matches_document(doc);

        match plan {
            QueryPlan::CollectionScan => self.scan(is_match, first_only),
            QueryPlan::IdLookup { id } => self
                .documents
                .get_full(id.as_str())
                .filter(|(_, _, doc)| is_match(doc))
                .map(|(pos, _, _)| pos)
                .into_iter()
                .collect(),
            QueryPlan::IndexScan { field, key } => {
                let Some(index) = self.indexes.get(field) else {
                    return self.index_fallback(field, is_match, first_only);
                };
                // indexed but value absent: nothing can match
                let Some(id) = index.get(key) else {
                    return Vec::new();
                };
                match self.documents.get_full(id.as_str()) {
                    Some((pos, _, doc)) if is_match(doc) => vec![pos],
                    Some(_) => Vec::new(),
                    None => self.index_fallback(field, is_match, first_only),
                }
            }
        }
    }

    pub fn get_at(&self, pos: usize) -> Option<&Document> {
        self.documents.get_index(pos).map(|(_, doc)| doc)
    }

    /// Apply `update` to the document at `pos`, keeping indexes in step.
    /// Returns the updated copy and whether any field actually changed.
    pub fn update_at(&mut self, pos: usize, update: &UpdateSpec) -> Option<(Document, bool)> {
        let (_, doc) = self.documents.get_index_mut(pos)?;
        let old = doc.clone();
        update.apply(doc);
        if old == *doc {
            return Some((old, false));
        }
        self.indexes.update_document(&old, doc);
        Some((doc.clone(), true))
    }

    pub fn remove_at(&mut self, pos: usize) -> Option<Document> {
        let (_, doc) = self.documents.shift_remove_index(pos)?;
        self.indexes.remove_document(&doc);
        Some(doc)
    }

    fn scan(&self, is_match: impl Fn(&Document) -> bool, first_only: bool) -> Vec<usize> {
        let mut hits = Vec::new();
        for (pos, doc) in self.documents.values().enumerate() {
            if is_match(doc) {
                hits.push(pos);
                if first_only {
                    break;
                }
            }
        }
        hits
    }

    // Index and documents disagree. Unreachable with correct maintenance.
    fn index_fallback(&self, field: &str, is_match: impl Fn(&Document) -> bool, first_only: bool) -> Vec<usize> {
        error!(collection = %self.name, field, "index inconsistent with collection, falling back to scan");
        debug_assert!(false, "index on {}.{} is inconsistent", self.name, field);
        self.scan(is_match, first_only)
    }
}

/// Parsed update payload.
///
/// A payload whose keys all start with `$` is a set of update operators;
/// anything else is merged field by field. `_id` and `owner_id` are silently
/// dropped either way.
#[derive(Debug, Clone)]
pub(crate) enum UpdateSpec {
    Merge(Map<String, Value>),
    Operators(Vec<UpdateOperator>),
}

#[derive(Debug, Clone)]
pub(crate) enum UpdateOperator {
    Set(Map<String, Value>),
    Unset(Vec<String>),
    Inc(Map<String, Value>),
}

impl UpdateSpec {
    pub fn from_json(update_json: &Value) -> Result<Self> {
        let fields = match update_json {
            Value::Object(map) => map,
            other => {
                return Err(AstroDbError::validation(format!(
                    "update must be an object, got {}",
                    json_type(other)
                )))
            }
        };

        let operator_keys = fields.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            return Ok(UpdateSpec::Merge(fields.clone()));
        }
        if operator_keys != fields.len() {
            return Err(AstroDbError::validation("update mixes operators and plain fields"));
        }

        let mut operators = Vec::with_capacity(fields.len());
        for (op, operand) in fields {
            let operand = operand.as_object().ok_or_else(|| {
                AstroDbError::validation(format!("{} requires an object", op))
            })?;
            let operator = match op.as_str() {
                "$set" => UpdateOperator::Set(operand.clone()),
                "$unset" => UpdateOperator::Unset(operand.keys().cloned().collect()),
                "$inc" => {
                    if let Some((field, _)) = operand.iter().find(|(_, v)| !v.is_number()) {
                        return Err(AstroDbError::validation(format!("$inc on '{}' requires a number", field)));
                    }
                    UpdateOperator::Inc(operand.clone())
                }
                _ => {
                    return Err(AstroDbError::validation(format!("Unsupported update operator: {}", op)));
                }
            };
            operators.push(operator);
        }
        Ok(UpdateSpec::Operators(operators))
    }

    pub fn apply(&self, doc: &mut Document) {
        match self {
            UpdateSpec::Merge(fields) => {
                for (field, value) in fields {
                    doc.set(field.clone(), value.clone());
                }
            }
            UpdateSpec::Operators(operators) => {
                for operator in operators {
                    operator.apply(doc);
                }
            }
        }
    }
}

impl UpdateOperator {
    fn apply(&self, doc: &mut Document) {
        match self {
            UpdateOperator::Set(fields) => {
                for (field, value) in fields {
                    doc.set(field.clone(), value.clone());
                }
            }
            UpdateOperator::Unset(fields) => {
                for field in fields {
                    doc.remove(field);
                }
            }
            UpdateOperator::Inc(fields) => {
                for (field, inc) in fields {
                    let next = match doc.get(field) {
                        None => inc.clone(),
                        // Try int first to preserve integer types
                        Some(current) => match (current.as_i64(), inc.as_i64()) {
                            (Some(a), Some(b)) => Value::from(a.saturating_add(b)),
                            _ => match (current.as_f64(), inc.as_f64()) {
                                (Some(a), Some(b)) => Value::from(a + b),
                                _ => continue,
                            },
                        },
                    };
                    doc.set(field.clone(), next);
                }
            }
        }
    }
}
