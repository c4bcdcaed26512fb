// src/backup.rs
// Timestamped copies of the data file, and restoring from them

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::config::StoreConfig;
use crate::database::{DocumentStore, LoadOutcome};
use crate::error::{AstroDbError, Result};
use crate::storage::write_atomic;

const BACKUP_PREFIX: &str = "database_";
const BACKUP_SUFFIX: &str = ".adb.bak";
// YYYYmmdd_HHMMSS_mmm
const STAMP_LEN: usize = 19;

/// Copies the encrypted data file into a backup directory.
///
/// Backups are the sealed bytes as found on disk; nothing is decrypted or
/// validated in either direction.
#[derive(Debug, Clone)]
pub struct BackupManager {
    data_path: PathBuf,
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(config: &StoreConfig) -> Self {
        BackupManager {
            data_path: config.path.clone(),
            backup_dir: config.backup_dir.clone(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copy the data file to `database_<YYYYmmdd_HHMMSS_mmm>.adb.bak`.
    /// Returns the path of the new backup.
    pub fn create_backup(&self) -> Result<PathBuf> {
        if !self.data_path.is_file() {
            return Err(AstroDbError::Backup(format!(
                "data file {} does not exist",
                self.data_path.display()
            )));
        }
        fs::create_dir_all(&self.backup_dir)?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let mut target = self.backup_dir.join(format!("{}{}{}", BACKUP_PREFIX, stamp, BACKUP_SUFFIX));
        let mut attempt = 1;
        while target.exists() {
            target = self
                .backup_dir
                .join(format!("{}{}_{}{}", BACKUP_PREFIX, stamp, attempt, BACKUP_SUFFIX));
            attempt += 1;
        }

        let bytes = fs::copy(&self.data_path, &target)?;
        info!(backup = %target.display(), bytes, "backup created");
        Ok(target)
    }

    /// Backup file names, oldest first
    pub fn list_backups(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_by_cached_key(|name| backup_order(name));
        Ok(names)
    }

    pub fn latest_backup(&self) -> Result<Option<String>> {
        Ok(self.list_backups()?.pop())
    }

    /// Overwrite the data file with backup `name` and reload `store` from it
    pub fn restore_backup(&self, name: &str, store: &DocumentStore) -> Result<LoadOutcome> {
        if !is_plain_file_name(name) {
            return Err(AstroDbError::Backup(format!("invalid backup name '{}'", name)));
        }
        let source = self.backup_dir.join(name);
        if !source.is_file() {
            return Err(AstroDbError::Backup(format!("backup '{}' not found", name)));
        }

        let bytes = fs::read(&source)?;
        write_atomic(&self.data_path, &bytes)?;
        info!(backup = name, data_file = %self.data_path.display(), "backup restored");

        Ok(store.load_from_disk())
    }
}

/// (timestamp, collision counter) parsed from a backup name. Timestamps sort
/// chronologically as text; the counter must compare numerically.
fn backup_order(name: &str) -> (String, u64) {
    let stem = name
        .strip_prefix(BACKUP_PREFIX)
        .and_then(|rest| rest.strip_suffix(BACKUP_SUFFIX))
        .unwrap_or(name);
    match stem.get(STAMP_LEN..).and_then(|rest| rest.strip_prefix('_')) {
        Some(counter) => match counter.parse() {
            Ok(n) => (stem[..STAMP_LEN].to_string(), n),
            Err(_) => (stem.to_string(), 0),
        },
        None => (stem.to_string(), 0),
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().map_or(false, |n| n == name)
}
