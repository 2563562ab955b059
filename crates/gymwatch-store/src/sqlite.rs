//! Durable SQLite-backed cache backend.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::backend::CacheBackend;
use crate::error::{Error, Result};

/// SQLite-backed implementation of [`CacheBackend`].
///
/// One table, one row per namespaced key. WAL mode keeps writes cheap for
/// the poller's once-per-tick snapshot write.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening cache database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl CacheBackend for SqliteBackend {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let value = conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        conn.execute(
            "INSERT INTO cache_entries (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", [key])?;
        Ok(())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<()> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        // The namespace prefix contains no LIKE metacharacters, but escape
        // defensively so arbitrary prefixes stay literal.
        let pattern = format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        conn.execute(
            "DELETE FROM cache_entries WHERE key LIKE ?1 ESCAPE '\\'",
            [pattern],
        )?;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
