//! Embedded SQLite handle.
//!
//! One database file (`cyfr.db`) holds every relational table. SQLite
//! serialises writes internally; readers proceed concurrently under WAL.
//! Domain crates own their row mapping and go through [`Database::with_conn`]
//! for short critical sections.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::migrations;

/// Shared handle to the embedded database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sql`] if the file cannot be opened and
    /// [`StorageError::Migration`] if a migration step fails. Callers
    /// treat either as fatal at startup.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5_000)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        let applied = db.migrate()?;
        info!(path = %path.as_ref().display(), applied, "database ready");
        Ok(db)
    }

    /// Open an in-memory database with all migrations applied (tests).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Migration`] if a migration step fails.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database with no migrations applied.
    ///
    /// Exists so migration tests can stage legacy rows at intermediate
    /// schema versions.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sql`] if SQLite cannot allocate.
    pub fn in_memory_unmigrated() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection.
    ///
    /// The closure runs under the connection mutex; keep it short and
    /// never await inside it.
    ///
    /// # Errors
    ///
    /// Propagates SQL failures from the closure.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<T> {
        let guard = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(f(&guard)?)
    }

    /// Apply every pending migration in order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Migration`] naming the failing step.
    pub fn migrate(&self) -> StorageResult<usize> {
        self.migrate_to(u32::MAX)
    }

    /// Apply pending migrations up to and including `max_version`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Migration`] naming the failing step.
    pub fn migrate_to(&self, max_version: u32) -> StorageResult<usize> {
        let guard = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        migrations::apply(&guard, max_version)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/cyfr.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        let count: i64 = db
            .with_conn(|c| {
                c.query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            })
            .unwrap();
        assert!(count > 0);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.migrate().unwrap(), 0);
    }
}
