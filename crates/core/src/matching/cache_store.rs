//! Persistent storage for semantic match verdicts.
//!
//! Used when `persist_to_storage` is enabled so verdicts survive restarts.
//! The store mirrors the in-memory key -> verdict map; it has no say in
//! cache hits, which are always served from memory.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use thiserror::Error;

use super::types::{CacheKey, CachedVerdict};

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for CacheStoreError {
    fn from(e: rusqlite::Error) -> Self {
        CacheStoreError::Database(e.to_string())
    }
}

/// Trait for semantic cache persistence.
pub trait CacheStore: Send + Sync {
    /// Load every persisted verdict.
    fn load_all(&self) -> Result<Vec<(CacheKey, CachedVerdict)>, CacheStoreError>;

    /// Insert or replace the verdict for a key.
    fn put(&self, key: &CacheKey, verdict: &CachedVerdict) -> Result<(), CacheStoreError>;

    /// Remove all persisted verdicts.
    fn clear(&self) -> Result<(), CacheStoreError>;
}

/// SQLite-backed semantic cache store.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open (or create) the store at `path`.
    pub fn new(path: &Path) -> Result<Self, CacheStoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, CacheStoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS semantic_cache (
                patient_term TEXT NOT NULL,
                criterion_term TEXT NOT NULL,
                match_type TEXT NOT NULL,
                matched INTEGER NOT NULL,
                confidence REAL NOT NULL,
                reasoning TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (patient_term, criterion_term, match_type)
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheStore for SqliteCacheStore {
    fn load_all(&self) -> Result<Vec<(CacheKey, CachedVerdict)>, CacheStoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT patient_term, criterion_term, match_type, matched, confidence, reasoning
             FROM semantic_cache",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                CacheKey {
                    patient_term: row.get(0)?,
                    criterion_term: row.get(1)?,
                    match_type: row.get(2)?,
                },
                CachedVerdict {
                    matched: row.get(3)?,
                    confidence: row.get(4)?,
                    reasoning: row.get(5)?,
                },
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn put(&self, key: &CacheKey, verdict: &CachedVerdict) -> Result<(), CacheStoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO semantic_cache
             (patient_term, criterion_term, match_type, matched, confidence, reasoning, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key.patient_term,
                key.criterion_term,
                key.match_type,
                verdict.matched,
                verdict.confidence,
                verdict.reasoning,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheStoreError> {
        self.conn().execute("DELETE FROM semantic_cache", [])?;
        Ok(())
    }
}
