// src/config.rs
// Store configuration

use std::path::PathBuf;

/// Default encrypted data file
pub const DEFAULT_DATA_FILE: &str = "database.json.encrypted";
/// Default directory for backups
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Configuration for opening a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Encrypted data file.
    pub path: PathBuf,

    /// Where [`BackupManager`](crate::BackupManager) puts its copies.
    pub backup_dir: PathBuf,

    /// Consult point indexes for bare equality queries. Off gives a pure-scan store.
    pub use_indexes: bool,

    /// Save through temp file + fsync + rename instead of overwriting in place.
    pub atomic_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATA_FILE),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            use_indexes: true,
            atomic_writes: true,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn use_indexes(mut self, value: bool) -> Self {
        self.use_indexes = value;
        self
    }

    #[must_use]
    pub const fn atomic_writes(mut self, value: bool) -> Self {
        self.atomic_writes = value;
        self
    }
}
