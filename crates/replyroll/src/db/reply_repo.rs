//! Stored inbound replies. One row per distinct Message-ID.

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension, Row};

use super::{now_timestamp, Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct ReplyRow {
    pub id: i64,
    pub project_id: Option<i64>,
    pub teacher_id: Option<i64>,
    pub from_email: String,
    pub subject: String,
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub received_at: String,
    /// JSON object of header name to raw values.
    pub raw_headers: String,
    pub body_text: String,
    pub created_at: String,
}

impl ReplyRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            teacher_id: row.get("teacher_id")?,
            from_email: row.get("from_email")?,
            subject: row.get("subject")?,
            message_id: row.get("message_id")?,
            in_reply_to: row.get("in_reply_to")?,
            received_at: row.get("received_at")?,
            raw_headers: row.get("raw_headers")?,
            body_text: row.get("body_text")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewReply<'a> {
    pub project_id: i64,
    pub teacher_id: i64,
    pub from_email: &'a str,
    pub subject: &'a str,
    pub message_id: &'a str,
    pub in_reply_to: Option<&'a str>,
    pub received_at: &'a str,
    pub raw_headers: &'a BTreeMap<String, Vec<String>>,
    pub body_text: &'a str,
}

pub fn exists_by_message_id(db: &Database, message_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM replies WHERE message_id = ?1",
                params![message_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    })
}

/// Inserts a reply. Returns `None` when a reply with the same Message-ID
/// is already stored.
pub fn insert(db: &Database, reply: &NewReply<'_>) -> Result<Option<i64>, DatabaseError> {
    let headers = serde_json::to_string(reply.raw_headers).map_err(|e| DatabaseError::Encode {
        column: "raw_headers",
        reason: e.to_string(),
    })?;

    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO replies (project_id, teacher_id, from_email, subject,
             message_id, in_reply_to, received_at, raw_headers, body_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                reply.project_id,
                reply.teacher_id,
                reply.from_email,
                reply.subject,
                reply.message_id,
                reply.in_reply_to,
                reply.received_at,
                headers,
                reply.body_text,
                now_timestamp(),
            ],
        )?;
        if changed == 0 {
            Ok(None)
        } else {
            Ok(Some(conn.last_insert_rowid()))
        }
    })
}

pub fn find_by_message_id(
    db: &Database,
    message_id: &str,
) -> Result<Option<ReplyRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM replies WHERE message_id = ?1",
                params![message_id],
                ReplyRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Receipt time of the newest stored reply for a membership.
pub fn latest_received_at(
    db: &Database,
    project_id: i64,
    teacher_id: i64,
) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(received_at) FROM replies WHERE project_id = ?1 AND teacher_id = ?2",
            params![project_id, teacher_id],
            |r| r.get(0),
        )?;
        Ok(latest)
    })
}

pub fn count_for_project(db: &Database, project_id: i64) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM replies WHERE project_id = ?1",
            params![project_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
