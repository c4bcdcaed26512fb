// src/database.rs
// Document store - the public, owner-scoped API over all collections

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::collection_core::{CollectionCore, UpdateSpec};
use crate::config::StoreConfig;
use crate::document::Document;
use crate::error::{AstroDbError, Result};
use crate::query::{json_type, Query};
use crate::query_planner::{QueryPlan, QueryPlanner};
use crate::storage::{Cipher, PersistenceCodec, StoreSnapshot};

/// What `load_from_disk` found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No data file; the store is empty
    Missing,
    /// Zero-length data file; the store is empty
    Empty,
    Loaded { collections: usize, documents: usize },
    /// The file could not be read, decrypted or decoded; the store was reset to empty
    Reset { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { bytes: usize },
    /// Nothing was written; in-memory state is untouched
    Failed { reason: String },
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

#[derive(Debug, Default)]
struct StoreState {
    collections: BTreeMap<String, CollectionCore>,
}

/// Embedded multi-tenant JSON document store.
///
/// Every operation holds one store-wide lock for its whole duration, so each call
/// is atomic with respect to every other call. Documents go in and come out as
/// copies. Share across threads with `Arc<DocumentStore>`.
pub struct DocumentStore {
    state: Mutex<StoreState>,
    codec: PersistenceCodec,
    config: StoreConfig,
}

impl DocumentStore {
    /// Empty store bound to `config.path`. Nothing is read from disk.
    pub fn new(config: StoreConfig, cipher: Arc<dyn Cipher>) -> Self {
        let codec = PersistenceCodec::new(config.path.clone(), cipher, config.atomic_writes);
        DocumentStore {
            state: Mutex::new(StoreState::default()),
            codec,
            config,
        }
    }

    /// Create the store and load whatever `config.path` holds
    pub fn open(config: StoreConfig, cipher: Arc<dyn Cipher>) -> Self {
        let store = Self::new(config, cipher);
        store.load_from_disk();
        store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ========== Writes ==========

    pub fn insert_one(&self, collection: &str, document: Value, owner_id: &str) -> Result<Document> {
        require_name("collection", collection)?;
        let fields = into_object("document", document)?;

        let mut state = self.state.lock();
        let doc = state.collection_mut(collection).insert(fields, owner_id);
        debug!(collection, id = %doc.id(), "inserted document");
        Ok(doc)
    }

    /// Insert several documents under one lock. Every payload is checked first,
    /// so a bad one means nothing is inserted.
    pub fn insert_many(&self, collection: &str, documents: Vec<Value>, owner_id: &str) -> Result<Vec<Document>> {
        require_name("collection", collection)?;
        let payloads = documents
            .into_iter()
            .map(|doc| into_object("document", doc))
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.state.lock();
        let target = state.collection_mut(collection);
        let inserted: Vec<Document> = payloads
            .into_iter()
            .map(|fields| target.insert(fields, owner_id))
            .collect();
        debug!(collection, count = inserted.len(), total = target.len(), "inserted documents");
        Ok(inserted)
    }

    /// Update the first owned match, in storage order
    pub fn update_one(&self, collection: &str, query: &Value, update: &Value, owner_id: &str) -> Result<Option<Document>> {
        let query = Query::from_json(query)?;
        let update = UpdateSpec::from_json(update)?;

        let mut state = self.state.lock();
        let Some(target) = state.collections.get_mut(collection) else {
            return Ok(None);
        };
        let plan = target.plan(&query, self.config.use_indexes);
        let updated = target
            .positions(&query, owner_id, &plan, true)
            .first()
            .and_then(|&pos| target.update_at(pos, &update))
            .map(|(doc, _)| doc);
        Ok(updated)
    }

    /// Apply `update` to every owned match. Returns how many documents changed;
    /// matches the update leaves as they were are not counted.
    pub fn update_many(&self, collection: &str, query: &Value, update: &Value, owner_id: &str) -> Result<usize> {
        let query = Query::from_json(query)?;
        let update = UpdateSpec::from_json(update)?;

        let mut state = self.state.lock();
        let Some(target) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let plan = target.plan(&query, self.config.use_indexes);
        let positions = target.positions(&query, owner_id, &plan, false);
        let updated = positions
            .into_iter()
            .filter(|&pos| matches!(target.update_at(pos, &update), Some((_, true))))
            .count();
        debug!(collection, updated, "updated documents");
        Ok(updated)
    }

    pub fn delete_one(&self, collection: &str, query: &Value, owner_id: &str) -> Result<Option<Document>> {
        let query = Query::from_json(query)?;

        let mut state = self.state.lock();
        let Some(target) = state.collections.get_mut(collection) else {
            return Ok(None);
        };
        let plan = target.plan(&query, self.config.use_indexes);
        let removed = target
            .positions(&query, owner_id, &plan, true)
            .first()
            .and_then(|&pos| target.remove_at(pos));
        Ok(removed)
    }

    /// Delete every owned match. Returns how many documents were removed.
    pub fn delete_many(&self, collection: &str, query: &Value, owner_id: &str) -> Result<usize> {
        let query = Query::from_json(query)?;

        let mut state = self.state.lock();
        let Some(target) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let plan = target.plan(&query, self.config.use_indexes);
        let positions = target.positions(&query, owner_id, &plan, false);

        // highest position first so earlier positions stay valid
        let deleted = positions
            .into_iter()
            .rev()
            .filter(|&pos| target.remove_at(pos).is_some())
            .count();
        debug!(collection, deleted, "deleted documents");
        Ok(deleted)
    }

    /// (Re)build the point index on `field`, creating the collection if needed.
    /// Returns the number of distinct keys indexed.
    pub fn create_index(&self, collection: &str, field: &str) -> Result<usize> {
        require_name("collection", collection)?;
        require_name("field", field)?;

        let mut state = self.state.lock();
        let keys = state.collection_mut(collection).create_index(field);
        info!(collection, field, keys, "index created");
        Ok(keys)
    }

    // ========== Reads ==========

    /// All owned matches in storage order
    pub fn find(&self, collection: &str, query: &Value, owner_id: &str) -> Result<Vec<Document>> {
        let query = Query::from_json(query)?;

        let state = self.state.lock();
        let Some(source) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let plan = source.plan(&query, self.config.use_indexes);
        let docs = source
            .positions(&query, owner_id, &plan, false)
            .into_iter()
            .filter_map(|pos| source.get_at(pos).cloned())
            .collect();
        Ok(docs)
    }

    /// Alias of [`find`](Self::find)
    pub fn find_many(&self, collection: &str, query: &Value, owner_id: &str) -> Result<Vec<Document>> {
        self.find(collection, query, owner_id)
    }

    pub fn find_one(&self, collection: &str, query: &Value, owner_id: &str) -> Result<Option<Document>> {
        let query = Query::from_json(query)?;

        let state = self.state.lock();
        let Some(source) = state.collections.get(collection) else {
            return Ok(None);
        };
        let plan = source.plan(&query, self.config.use_indexes);
        let doc = source
            .positions(&query, owner_id, &plan, true)
            .first()
            .and_then(|&pos| source.get_at(pos).cloned());
        Ok(doc)
    }

    pub fn count_documents(&self, collection: &str, query: &Value, owner_id: &str) -> Result<usize> {
        let query = Query::from_json(query)?;

        let state = self.state.lock();
        let Some(source) = state.collections.get(collection) else {
            return Ok(0);
        };
        let plan = source.plan(&query, self.config.use_indexes);
        Ok(source.positions(&query, owner_id, &plan, false).len())
    }

    /// Collection names, sorted
    pub fn list_collections(&self) -> Vec<String> {
        self.state.lock().collections.keys().cloned().collect()
    }

    /// Secondary index fields of `collection`, sorted. `_id` is implicit and not listed.
    pub fn list_indexes(&self, collection: &str) -> Vec<String> {
        self.state
            .lock()
            .collections
            .get(collection)
            .map(CollectionCore::index_fields)
            .unwrap_or_default()
    }

    /// Access path a query would take
    pub fn explain(&self, collection: &str, query: &Value) -> Result<QueryPlan> {
        let query = Query::from_json(query)?;

        let state = self.state.lock();
        Ok(state
            .collections
            .get(collection)
            .map_or(QueryPlan::CollectionScan, |source| source.plan(&query, self.config.use_indexes)))
    }

    /// [`explain`](Self::explain) rendered as JSON
    pub fn explain_query(&self, collection: &str, query: &Value) -> Result<Value> {
        let plan = self.explain(collection, query)?;
        let available = self.list_indexes(collection);
        Ok(QueryPlanner::explain(&plan, &available))
    }

    // ========== Persistence ==========

    /// Replace all in-memory state with the file contents.
    ///
    /// Never fails: an unreadable, undecryptable or malformed file is logged and
    /// leaves an empty store.
    pub fn load_from_disk(&self) -> LoadOutcome {
        let mut state = self.state.lock();
        match self.read_state() {
            Ok((loaded, outcome)) => {
                *state = loaded;
                outcome
            }
            Err(e) => {
                error!(path = %self.codec.path().display(), error = %e, "failed to load store, starting empty");
                *state = StoreState::default();
                LoadOutcome::Reset { reason: e.to_string() }
            }
        }
    }

    /// Like [`load_from_disk`](Self::load_from_disk), but a failure is returned
    /// and in-memory state is left as it was.
    pub fn try_load_from_disk(&self) -> Result<LoadOutcome> {
        let mut state = self.state.lock();
        let (loaded, outcome) = self.read_state()?;
        *state = loaded;
        Ok(outcome)
    }

    /// Write the whole store to disk. Failure is logged and reported in the outcome.
    pub fn save_to_disk(&self) -> SaveOutcome {
        match self.try_save_to_disk() {
            Ok(bytes) => SaveOutcome::Saved { bytes },
            Err(e) => {
                error!(path = %self.codec.path().display(), error = %e, "failed to save store");
                SaveOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    /// Write the whole store to disk, returning the number of bytes written
    pub fn try_save_to_disk(&self) -> Result<usize> {
        let state = self.state.lock();

        let mut snapshot = StoreSnapshot::new();
        for (name, collection) in &state.collections {
            snapshot.add_collection(name, collection.documents(), collection.index_fields());
        }
        let sealed = self.codec.encode(&snapshot)?;
        self.codec.write_blob(&sealed)?;

        info!(
            path = %self.codec.path().display(),
            collections = state.collections.len(),
            bytes = sealed.len(),
            "store saved"
        );
        Ok(sealed.len())
    }

    fn read_state(&self) -> Result<(StoreState, LoadOutcome)> {
        let path = self.codec.path().display();
        let bytes = match self.codec.read_blob()? {
            None => {
                info!(%path, "no data file, starting empty");
                return Ok((StoreState::default(), LoadOutcome::Missing));
            }
            Some(bytes) if bytes.is_empty() => {
                warn!(%path, "data file is empty, starting empty");
                return Ok((StoreState::default(), LoadOutcome::Empty));
            }
            Some(bytes) => bytes,
        };

        let mut persisted = self.codec.decode(&bytes)?;
        let documents = persisted.document_count();

        let mut state = StoreState::default();
        for (name, docs) in std::mem::take(&mut persisted.collections) {
            let fields = persisted.index_definitions.remove(&name).unwrap_or_default();
            state.collections.insert(name.clone(), CollectionCore::restore(&name, docs, &fields));
        }
        // index definitions for collections that held no documents array
        for (name, fields) in persisted.index_definitions {
            state.collections.insert(name.clone(), CollectionCore::restore(&name, Vec::new(), &fields));
        }

        let collections = state.collections.len();
        info!(%path, collections, documents, "store loaded");
        Ok((state, LoadOutcome::Loaded { collections, documents }))
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("config", &self.config)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl StoreState {
    fn collection_mut(&mut self, name: &str) -> &mut CollectionCore {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| CollectionCore::new(name))
    }
}

fn require_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AstroDbError::validation(format!("{} name must not be empty", kind)));
    }
    Ok(())
}

fn into_object(kind: &str, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(AstroDbError::validation(format!(
            "{} must be an object, got {}",
            kind,
            json_type(&other)
        ))),
    }
}
