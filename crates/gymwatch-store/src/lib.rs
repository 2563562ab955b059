//! Namespaced TTL cache for gym machine fleet data.
//!
//! This crate provides the key-value caching layer the polling service and
//! the derived-data cache rest on: values are stored as
//! `{prefix}{key} -> {data, written_at}` pairs and validity is evaluated
//! lazily at read time against a caller-supplied TTL.
//!
//! # Features
//!
//! - Expiry-on-read with no background sweep
//! - Writes that never fail the caller (quota errors degrade to a logged no-op)
//! - Pluggable backends: durable SQLite or an in-memory map
//! - Versioned key namespace for cache-schema migrations
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use gymwatch_store::{CacheStore, MemoryBackend, SNAPSHOT_TTL};
//!
//! let store = CacheStore::new(Arc::new(MemoryBackend::new()));
//! store.set("machines_rec", &vec!["treadmill-1"]);
//! let cached: Option<Vec<String>> = store.get("machines_rec", SNAPSHOT_TTL);
//! assert!(cached.is_some());
//! ```

mod backend;
mod error;
mod sqlite;
mod store;

pub use backend::{CacheBackend, MemoryBackend};
pub use error::{Error, Result};
pub use sqlite::SqliteBackend;
pub use store::{CacheStore, GEOMETRY_TTL, NAMESPACE, PREDICTION_TTL, SNAPSHOT_TTL};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/gymwatch/cache.db`
/// - macOS: `~/Library/Application Support/gymwatch/cache.db`
/// - Windows: `C:\Users\<user>\AppData\Local\gymwatch\cache.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("gymwatch")
        .join("cache.db")
}
