// storage/mod.rs
// Persistence codec - whole-store snapshot <-> encrypted file

mod cipher;
mod io;

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::Document;
use crate::error::{AstroDbError, Result};

pub use cipher::{AesGcmCipher, Cipher, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use io::{temp_path, write_atomic, write_direct};

/// Decoded file contents
#[derive(Deserialize, Debug, Default)]
pub struct PersistedStore {
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<Document>>,

    #[serde(default, rename = "_index_definitions")]
    pub index_definitions: BTreeMap<String, Vec<String>>,
}

impl PersistedStore {
    pub fn document_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// Borrowed view of the live store, serialized in the same layout as
/// [`PersistedStore`] without cloning documents.
#[derive(Serialize, Debug, Default)]
pub struct StoreSnapshot<'a> {
    collections: BTreeMap<&'a str, Vec<&'a Document>>,

    #[serde(rename = "_index_definitions")]
    index_definitions: BTreeMap<&'a str, Vec<String>>,
}

impl<'a> StoreSnapshot<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collection(
        &mut self,
        name: &'a str,
        documents: impl IntoIterator<Item = &'a Document>,
        index_fields: Vec<String>,
    ) {
        self.collections.insert(name, documents.into_iter().collect());
        if !index_fields.is_empty() {
            self.index_definitions.insert(name, index_fields);
        }
    }
}

/// Turns store snapshots into sealed bytes on disk and back
#[derive(Clone)]
pub struct PersistenceCodec {
    path: PathBuf,
    cipher: Arc<dyn Cipher>,
    atomic_writes: bool,
}

impl PersistenceCodec {
    pub fn new(path: impl Into<PathBuf>, cipher: Arc<dyn Cipher>, atomic_writes: bool) -> Self {
        PersistenceCodec {
            path: path.into(),
            cipher,
            atomic_writes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encode(&self, snapshot: &StoreSnapshot<'_>) -> Result<Vec<u8>> {
        let json = serde_json::to_string(snapshot)?;
        self.cipher.encrypt(&json)
    }

    /// Decrypt and parse. A blob that decrypts but does not describe a store
    /// is reported as corruption.
    pub fn decode(&self, bytes: &[u8]) -> Result<PersistedStore> {
        let json = self.cipher.decrypt(bytes)?;
        serde_json::from_str(&json).map_err(|e| AstroDbError::Corruption(format!("invalid store layout: {}", e)))
    }

    /// File contents, or `None` when the file does not exist
    pub fn read_blob(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_blob(&self, bytes: &[u8]) -> Result<()> {
        debug!(path = %self.path.display(), bytes = bytes.len(), atomic = self.atomic_writes, "writing store file");
        if self.atomic_writes {
            write_atomic(&self.path, bytes)
        } else {
            write_direct(&self.path, bytes)
        }
    }
}

impl std::fmt::Debug for PersistenceCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCodec")
            .field("path", &self.path)
            .field("atomic_writes", &self.atomic_writes)
            .finish_non_exhaustive()
    }
}
