// astrodb-core/src/lib.rs
// Embedded multi-tenant JSON document store

pub mod error;
pub mod config;
pub mod document;
pub mod query;
pub mod index;
pub mod query_planner;
pub mod storage;
pub mod database;
pub mod backup;
mod collection_core;

// Public exports
pub use error::{AstroDbError, Result};
pub use config::StoreConfig;
pub use document::{Document, DocumentId};
pub use query::{matches, Query};
pub use index::{FieldIndex, IndexKey, IndexManager};
pub use query_planner::{QueryPlan, QueryPlanner};
pub use storage::{AesGcmCipher, Cipher, EncryptionKey, PersistenceCodec};
pub use database::{DocumentStore, LoadOutcome, SaveOutcome};
pub use backup::BackupManager;
