//! SQLite-backed record store.
//!
//! The store is the single persistent artifact of ingestion: messages,
//! attachment metadata, calendar events, tag associations, extracted
//! entities, and optional embeddings. WAL mode keeps concurrent external
//! readers (search, dossier generation) isolated from the single writer —
//! they see committed snapshots, and never coordinate with the pipeline.
//!
//! All rows are inserted inside per-batch transactions driven by the
//! pipeline; nothing in this layer mutates a message or event in place.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

pub mod embeddings;
pub mod entities;
pub mod events;
pub mod messages;
pub mod tags;

pub use messages::{SearchHit, StoredMessage};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create store directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Migration failed: {0}")]
    Migration(String),
}

pub struct MailDb {
    conn: Connection,
}

impl MailDb {
    /// Open (or create) the store at `path` and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL for concurrent external readers during ingest
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Open the store read-only. Used by the search/report/export commands
    /// so they can run safely against a store mid-ingest.
    pub fn open_readonly(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Self) -> Result<T, String>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| format!("Failed to begin transaction: {e}"))?;
        match f(self) {
            Ok(val) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| format!("Failed to commit transaction: {e}"))?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

}

// =============================================================================
// Shared test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::MailDb;

    /// Create a temporary store for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of
    /// the test; test temp dirs are cleaned up by the OS.
    pub fn test_db() -> MailDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        MailDb::open(&path).expect("Failed to open test store")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_open_creates_tables() {
        let db = test_db();
        for table in [
            "messages",
            "attachments",
            "events",
            "tag_associations",
            "entities",
            "message_embeddings",
        ] {
            let count: i32 = db
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap_or_else(|e| panic!("{table} table should exist: {e}"));
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn test_idempotent_schema_application() {
        // Opening the same store twice should not error (IF NOT EXISTS)
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("idempotent.db");

        let _db1 = MailDb::open(&path).expect("first open");
        let _db2 = MailDb::open(&path).expect("second open should not fail");
    }

    #[test]
    fn test_with_transaction_rolls_back_on_err() {
        let db = test_db();
        let result: Result<(), String> = db.with_transaction(|db| {
            db.conn_ref()
                .execute(
                    "INSERT INTO events (content_hash, source_archive, title)
                     VALUES ('h1', 'a', 'will roll back')",
                    [],
                )
                .map_err(|e| format!("{e}"))?;
            Err("forced failure".to_string())
        });
        assert!(result.is_err());

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0, "rolled-back insert must not persist");
    }

    #[test]
    fn test_with_transaction_commits_on_ok() {
        let db = test_db();
        db.with_transaction(|db| {
            db.conn_ref()
                .execute(
                    "INSERT INTO events (content_hash, source_archive, title)
                     VALUES ('h1', 'a', 'persisted')",
                    [],
                )
                .map_err(|e| format!("{e}"))?;
            Ok(())
        })
        .expect("transaction");

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }
}
