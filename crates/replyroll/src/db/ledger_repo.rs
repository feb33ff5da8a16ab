//! Append-only ledger of outbound Message-IDs, consulted when a reply
//! carries `In-Reply-To`.

use rusqlite::{params, OptionalExtension, Row};

use super::{now_timestamp, Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: i64,
    pub project_id: i64,
    pub teacher_id: i64,
    /// Normalized id (no angle brackets).
    pub message_id: String,
    pub sent_at: String,
}

impl LedgerEntry {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            teacher_id: row.get("teacher_id")?,
            message_id: row.get("message_id")?,
            sent_at: row.get("sent_at")?,
        })
    }
}

pub fn append(
    db: &Database,
    project_id: i64,
    teacher_id: i64,
    message_id: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sent_emails (project_id, teacher_id, message_id, sent_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![project_id, teacher_id, message_id, now_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Looks up the entry recorded for an outbound Message-ID.
pub fn find_by_message_id(
    db: &Database,
    message_id: &str,
) -> Result<Option<LedgerEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let entry = conn
            .query_row(
                "SELECT * FROM sent_emails WHERE message_id = ?1 ORDER BY id LIMIT 1",
                params![message_id],
                LedgerEntry::from_row,
            )
            .optional()?;
        Ok(entry)
    })
}

pub fn list_for_project(db: &Database, project_id: i64) -> Result<Vec<LedgerEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM sent_emails WHERE project_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![project_id], LedgerEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
