//! SQLite connection pool and schema
//!
//! Holds the imported defect records and the embedding cache

use crate::error::{BugbusterError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled SQLite database
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BugbusterError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| {
                BugbusterError::Config(format!("Failed to create connection pool: {}", e))
            })?;

        let db = Self { pool };
        db.init_schema()?;
        tracing::debug!("Opened defect database at {:?}", db_path);

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| BugbusterError::Config(format!("Failed to get connection: {}", e)))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let defect_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM defects", [], |row| row.get(0))?;

        let embedding_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;

        Ok(DbStats {
            defect_count: defect_count as usize,
            embedding_count: embedding_count as usize,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStats {
    pub defect_count: usize,
    pub embedding_count: usize,
}

const SCHEMA: &str = r#"
    -- Imported defect records, ingestion order is seq
    CREATE TABLE IF NOT EXISTS defects (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        key TEXT NOT NULL UNIQUE,
        record TEXT NOT NULL,          -- JSON DefectRecord
        content_hash TEXT NOT NULL,
        ingested_at TEXT NOT NULL
    );

    -- Embedding cache, valid while content_hash matches the record
    CREATE TABLE IF NOT EXISTS embeddings (
        key TEXT NOT NULL,
        model TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        vector BLOB NOT NULL,          -- little-endian f32
        created_at TEXT NOT NULL,
        PRIMARY KEY (key, model),
        FOREIGN KEY (key) REFERENCES defects(key) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(model);
"#;
