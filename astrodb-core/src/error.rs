// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AstroDbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wrong shape handed to the store by its caller
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Wrong key, or the blob is corrupted/truncated
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Database corruption: {0}")]
    Corruption(String),

    #[error("Backup error: {0}")]
    Backup(String),
}

impl AstroDbError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        AstroDbError::Validation(message.into())
    }

    pub(crate) fn invalid_query(message: impl Into<String>) -> Self {
        AstroDbError::InvalidQuery(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AstroDbError>;
