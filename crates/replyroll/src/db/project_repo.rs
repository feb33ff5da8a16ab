//! Request ("project") lookups over the `projects` table.

use rusqlite::{params, Row};

use super::{now_timestamp, Database, DatabaseError};

pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub status: String,
    pub subject_template: String,
    pub body_template: String,
    /// Spreadsheet template attached to dispatched mail, relative to the
    /// templates directory.
    pub template_file: Option<String>,
    /// Owner of the request; selects the mail account used for it.
    pub created_by: i64,
    pub created_at: String,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            name: row.get("name")?,
            status: row.get("status")?,
            subject_template: row.get("subject_template")?,
            body_template: row.get("body_template")?,
            template_file: row.get("template_file")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

/// Fields supplied when a project is created.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub code: String,
    pub name: String,
    pub subject_template: String,
    pub body_template: String,
    pub template_file: Option<String>,
    pub created_by: i64,
}

pub fn insert(db: &Database, project: &NewProject) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO projects (code, name, status, subject_template, body_template,
             template_file, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project.code,
                project.name,
                STATUS_ACTIVE,
                project.subject_template,
                project.body_template,
                project.template_file,
                project.created_by,
                now_timestamp(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<ProjectRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM projects WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ProjectRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn update_status(db: &Database, id: i64, status: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE projects SET status = ?2 WHERE id = ?1",
            params![id, status],
        )?;
        Ok(())
    })
}
