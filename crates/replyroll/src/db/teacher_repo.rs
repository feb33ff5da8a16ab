//! Recipient lookups over the `teachers` table.
//!
//! Teachers are owned by the directory layer; only the lookups ingestion
//! and dispatch need live here, plus `insert` for seeding.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
}

impl TeacherRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            department: row.get("department")?,
        })
    }
}

pub fn insert(
    db: &Database,
    name: &str,
    email: &str,
    department: Option<&str>,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO teachers (name, email, department) VALUES (?1, ?2, ?3)",
            params![name, email, department],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<TeacherRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT id, name, email, department FROM teachers WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], TeacherRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds every teacher registered under `email`, ignoring case and
/// surrounding whitespace.
pub fn find_by_email(db: &Database, email: &str) -> Result<Vec<TeacherRow>, DatabaseError> {
    let email = email.trim();
    if email.is_empty() {
        return Ok(Vec::new());
    }

    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, email, department FROM teachers
             WHERE lower(trim(email)) = lower(?1)
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![email], TeacherRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
