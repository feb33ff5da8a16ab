//! Audit rows, one per completed dispatch or reminder run.

use rusqlite::{params, Row};

use super::{now_timestamp, Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct DispatchRow {
    pub id: i64,
    pub project_id: i64,
    pub target_type: String,
    pub sent_count: i64,
    pub created_at: String,
}

impl DispatchRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            target_type: row.get("target_type")?,
            sent_count: row.get("sent_count")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(
    db: &Database,
    project_id: i64,
    target_type: &str,
    sent_count: usize,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO dispatches (project_id, target_type, sent_count, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![project_id, target_type, sent_count as i64, now_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn list_for_project(db: &Database, project_id: i64) -> Result<Vec<DispatchRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM dispatches WHERE project_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![project_id], DispatchRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
