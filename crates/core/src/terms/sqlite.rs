//! SQLite-backed term review store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    ApprovedTerm, ReviewStatus, SubmitOutcome, TermError, TermStore, TermType,
    UnknownTermSubmission,
};

/// SQLite-backed term store.
pub struct SqliteTermStore {
    conn: Mutex<Connection>,
}

impl SqliteTermStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TermError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, TermError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TermError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS review_terms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                term TEXT NOT NULL,
                term_type TEXT NOT NULL,
                context TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                synonyms TEXT NOT NULL DEFAULT '[]',
                submitted_at TEXT NOT NULL,
                reviewed_at TEXT,
                UNIQUE(term, term_type)
            );

            CREATE INDEX IF NOT EXISTS idx_review_terms_status ON review_terms(status, term_type);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn find_id(conn: &Connection, term: &str, term_type: TermType) -> Result<Option<i64>, TermError> {
        let id = conn
            .query_row(
                "SELECT id FROM review_terms WHERE term = ? AND term_type = ?",
                params![term, term_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn load_approved(conn: &Connection, id: i64) -> Result<ApprovedTerm, TermError> {
        let row = conn.query_row(
            "SELECT id, term, term_type, synonyms, reviewed_at FROM review_terms WHERE id = ?",
            params![id],
            raw_approved_row,
        )?;
        row.into_approved()
    }
}

struct RawApprovedRow {
    id: i64,
    term: String,
    term_type: String,
    synonyms: String,
    reviewed_at: Option<String>,
}

fn raw_approved_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawApprovedRow> {
    Ok(RawApprovedRow {
        id: row.get(0)?,
        term: row.get(1)?,
        term_type: row.get(2)?,
        synonyms: row.get(3)?,
        reviewed_at: row.get(4)?,
    })
}

impl RawApprovedRow {
    fn into_approved(self) -> Result<ApprovedTerm, TermError> {
        let term_type: TermType = self
            .term_type
            .parse()
            .map_err(|_| TermError::Database(format!("unknown term type: {}", self.term_type)))?;
        let synonyms: Vec<String> = serde_json::from_str(&self.synonyms)
            .map_err(|e| TermError::Database(format!("invalid synonyms for {}: {}", self.term, e)))?;
        let reviewed_at = self.reviewed_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        });

        Ok(ApprovedTerm {
            id: self.id,
            term: self.term,
            term_type,
            synonyms,
            reviewed_at,
        })
    }
}

impl TermStore for SqliteTermStore {
    fn submit_unknown(
        &self,
        submission: &UnknownTermSubmission,
    ) -> Result<SubmitOutcome, TermError> {
        let conn = self.conn();

        if let Some(id) = Self::find_id(&conn, submission.term(), submission.term_type())? {
            return Ok(SubmitOutcome::AlreadySubmitted { id });
        }

        conn.execute(
            "INSERT INTO review_terms (term, term_type, context, status, submitted_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                submission.term(),
                submission.term_type().as_str(),
                submission.context(),
                ReviewStatus::Pending.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(SubmitOutcome::Created {
            id: conn.last_insert_rowid(),
        })
    }

    fn approved(&self, term_type: Option<TermType>) -> Result<Vec<ApprovedTerm>, TermError> {
        let conn = self.conn();
        let type_filter = term_type.map(|t| t.as_str());

        let mut stmt = conn.prepare(
            "SELECT id, term, term_type, synonyms, reviewed_at FROM review_terms
             WHERE status = ?1 AND (?2 IS NULL OR term_type = ?2)
             ORDER BY term",
        )?;
        let rows = stmt.query_map(
            params![ReviewStatus::Approved.as_str(), type_filter],
            raw_approved_row,
        )?;

        let mut terms = Vec::new();
        for row in rows {
            terms.push(row?.into_approved()?);
        }
        Ok(terms)
    }

    fn approve(
        &self,
        term: &str,
        term_type: TermType,
        synonyms: &[String],
    ) -> Result<ApprovedTerm, TermError> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Err(TermError::Validation("Term must not be empty".to_string()));
        }

        let synonyms: Vec<String> = synonyms
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        let synonyms_json = serde_json::to_string(&synonyms)
            .map_err(|e| TermError::Database(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn();
        let id = match Self::find_id(&conn, &term, term_type)? {
            Some(id) => {
                conn.execute(
                    "UPDATE review_terms SET status = ?, synonyms = ?, reviewed_at = ? WHERE id = ?",
                    params![ReviewStatus::Approved.as_str(), synonyms_json, now, id],
                )?;
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO review_terms (term, term_type, status, synonyms, submitted_at, reviewed_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    params![
                        term,
                        term_type.as_str(),
                        ReviewStatus::Approved.as_str(),
                        synonyms_json,
                        now,
                        now,
                    ],
                )?;
                conn.last_insert_rowid()
            }
        };

        Self::load_approved(&conn, id)
    }
}
