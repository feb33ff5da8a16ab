//! Metadata rows for attachment files persisted from replies.

use rusqlite::{params, Row};

use super::{now_timestamp, Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct AttachmentRow {
    pub id: i64,
    pub reply_id: i64,
    pub project_id: Option<i64>,
    pub teacher_id: Option<i64>,
    /// Filename as sent by the teacher.
    pub filename: String,
    pub stored_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: String,
}

impl AttachmentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            reply_id: row.get("reply_id")?,
            project_id: row.get("project_id")?,
            teacher_id: row.get("teacher_id")?,
            filename: row.get("filename")?,
            stored_path: row.get("stored_path")?,
            content_type: row.get("content_type")?,
            size_bytes: row.get("size_bytes")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAttachment<'a> {
    pub reply_id: i64,
    pub project_id: i64,
    pub teacher_id: i64,
    pub filename: &'a str,
    pub stored_path: &'a str,
    pub content_type: &'a str,
    pub size_bytes: u64,
}

/// An attachment together with the teacher it came from, as the
/// aggregator consumes it.
#[derive(Debug, Clone)]
pub struct AggregationSource {
    pub attachment: AttachmentRow,
    pub teacher_name: Option<String>,
    pub teacher_email: Option<String>,
}

pub fn insert(db: &Database, attachment: &NewAttachment<'_>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO attachments (reply_id, project_id, teacher_id, filename, stored_path,
             content_type, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                attachment.reply_id,
                attachment.project_id,
                attachment.teacher_id,
                attachment.filename,
                attachment.stored_path,
                attachment.content_type,
                attachment.size_bytes as i64,
                now_timestamp(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn list_for_reply(db: &Database, reply_id: i64) -> Result<Vec<AttachmentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM attachments WHERE reply_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![reply_id], AttachmentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// All attachments of a project, earliest first, with teacher details
/// where the teacher still exists.
pub fn list_for_aggregation(
    db: &Database,
    project_id: i64,
) -> Result<Vec<AggregationSource>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT a.*, t.name AS teacher_name, t.email AS teacher_email
             FROM attachments a
             LEFT JOIN teachers t ON t.id = a.teacher_id
             WHERE a.project_id = ?1
             ORDER BY a.created_at ASC, a.id ASC",
        )?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(AggregationSource {
                    attachment: AttachmentRow::from_row(row)?,
                    teacher_name: row.get("teacher_name")?,
                    teacher_email: row.get("teacher_email")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
