//! Error types for gymwatch-store.

use std::path::PathBuf;

/// Result type for gymwatch-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gymwatch-store.
///
/// None of these escape [`crate::CacheStore::set`]: cache writes degrade to a
/// logged no-op, leaving any previous entry in place. Backends and the
/// fallible maintenance operations (`clear`, `clear_all`) do return them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create the database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The backing store refused the write because its entry quota is full.
    #[error("Cache quota exceeded ({limit} entries), key '{key}' not written")]
    QuotaExceeded { key: String, limit: usize },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
