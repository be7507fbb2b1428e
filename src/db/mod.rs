pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, DbError>;

/// SQLite-backed fingerprint index.
///
/// The connection sits behind a mutex so one `Database` can be shared by the
/// indexing worker pool; SQLite serializes writers anyway.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        // WAL mode for better concurrent read performance
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::migrate(&conn)?;
        Ok(())
    }

    fn migrate(conn: &Connection) -> Result<()> {
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
            )));
        }
        if version < 1 {
            Self::migrate_v1(conn)?;
        }

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: tracks + fingerprints
    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            -- AUTOINCREMENT: ids of deleted tracks are never handed out again
            CREATE TABLE IF NOT EXISTS tracks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                artist          TEXT NOT NULL,
                external_ref    TEXT NOT NULL DEFAULT '',
                track_key       TEXT NOT NULL UNIQUE,
                content_hash    TEXT,
                duration_secs   REAL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_tracks_external_ref ON tracks(external_ref);
            CREATE INDEX IF NOT EXISTS idx_tracks_content_hash ON tracks(content_hash);

            CREATE TABLE IF NOT EXISTS fingerprints (
                address         INTEGER NOT NULL,
                track_id        INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                anchor_time_ms  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_fingerprints_address ON fingerprints(address);
            CREATE INDEX IF NOT EXISTS idx_fingerprints_track ON fingerprints(track_id);
            ",
        )?;
        Ok(())
    }
}

const SCHEMA_VERSION: i32 = 1;
