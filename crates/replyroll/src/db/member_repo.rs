//! Membership rows linking a project to its teachers, with send/reply state.

use rusqlite::{params, OptionalExtension, Row};

use super::project_repo::STATUS_ACTIVE;
use super::{Database, DatabaseError};

/// Lifecycle of one (project, teacher) membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Pending,
    Sent,
    Replied,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Pending => "pending",
            MemberStatus::Sent => "sent",
            MemberStatus::Replied => "replied",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(MemberStatus::Pending),
            "sent" => Some(MemberStatus::Sent),
            "replied" => Some(MemberStatus::Replied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemberRow {
    pub id: i64,
    pub project_id: i64,
    pub teacher_id: i64,
    pub sent_at: Option<String>,
    pub current_status: String,
    pub last_reply_at: Option<String>,
}

impl MemberRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            teacher_id: row.get("teacher_id")?,
            sent_at: row.get("sent_at")?,
            current_status: row.get("current_status")?,
            last_reply_at: row.get("last_reply_at")?,
        })
    }

    /// Status as seen by callers: a pending member whose mail went out
    /// reads as `Sent`.
    pub fn effective_status(&self) -> MemberStatus {
        match MemberStatus::parse(&self.current_status) {
            Some(MemberStatus::Replied) => MemberStatus::Replied,
            Some(MemberStatus::Sent) => MemberStatus::Sent,
            _ if self.sent_at.is_some() => MemberStatus::Sent,
            _ => MemberStatus::Pending,
        }
    }
}

/// A membership joined with the teacher's directory entry.
#[derive(Debug, Clone)]
pub struct MemberOverview {
    pub member: MemberRow,
    pub teacher_name: String,
    pub teacher_email: String,
    pub department: Option<String>,
}

/// Adds a teacher to a project. Returns `false` when the pair already exists.
pub fn add(db: &Database, project_id: i64, teacher_id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO project_members (project_id, teacher_id, current_status)
             VALUES (?1, ?2, 'pending')",
            params![project_id, teacher_id],
        )?;
        Ok(changed > 0)
    })
}

pub fn find(
    db: &Database,
    project_id: i64,
    teacher_id: i64,
) -> Result<Option<MemberRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM project_members WHERE project_id = ?1 AND teacher_id = ?2",
                params![project_id, teacher_id],
                MemberRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Records that mail went out, creating the membership if it is missing.
pub fn mark_sent(
    db: &Database,
    project_id: i64,
    teacher_id: i64,
    sent_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO project_members (project_id, teacher_id, sent_at, current_status)
             VALUES (?1, ?2, ?3, 'pending')
             ON CONFLICT (project_id, teacher_id) DO UPDATE SET sent_at = excluded.sent_at",
            params![project_id, teacher_id, sent_at],
        )?;
        Ok(())
    })
}

/// Marks a membership replied. `last_reply_at` only ever moves forward.
/// Returns `false` when no membership row exists for the pair.
pub fn mark_replied(
    db: &Database,
    project_id: i64,
    teacher_id: i64,
    replied_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE project_members
             SET current_status = 'replied',
                 last_reply_at = CASE
                     WHEN last_reply_at IS NULL OR last_reply_at < ?3 THEN ?3
                     ELSE last_reply_at
                 END
             WHERE project_id = ?1 AND teacher_id = ?2",
            params![project_id, teacher_id, replied_at],
        )?;
        Ok(changed > 0)
    })
}

/// Overwrites status and reply time; used when rebuilding state from replies.
pub fn set_reply_state(
    db: &Database,
    project_id: i64,
    teacher_id: i64,
    status: MemberStatus,
    last_reply_at: Option<&str>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE project_members SET current_status = ?3, last_reply_at = ?4
             WHERE project_id = ?1 AND teacher_id = ?2",
            params![project_id, teacher_id, status.as_str(), last_reply_at],
        )?;
        Ok(changed > 0)
    })
}

/// Teachers that have not been sent the initial mail yet.
pub fn pending_dispatch_targets(db: &Database, project_id: i64) -> Result<Vec<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT teacher_id FROM project_members
             WHERE project_id = ?1 AND sent_at IS NULL
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![project_id], |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

/// Teachers that have not replied yet.
pub fn pending_reply_targets(db: &Database, project_id: i64) -> Result<Vec<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT teacher_id FROM project_members
             WHERE project_id = ?1 AND current_status = 'pending'
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![project_id], |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

/// Active projects the teacher is a member of, in ascending id order.
pub fn active_projects_for_teacher(
    db: &Database,
    teacher_id: i64,
) -> Result<Vec<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT pm.project_id FROM project_members pm
             JOIN projects p ON p.id = pm.project_id
             WHERE pm.teacher_id = ?1 AND p.status = ?2
             ORDER BY pm.project_id",
        )?;
        let ids = stmt
            .query_map(params![teacher_id, STATUS_ACTIVE], |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

pub fn list_for_project(
    db: &Database,
    project_id: i64,
) -> Result<Vec<MemberOverview>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT pm.*, t.name AS teacher_name, t.email AS teacher_email, t.department
             FROM project_members pm
             JOIN teachers t ON t.id = pm.teacher_id
             WHERE pm.project_id = ?1
             ORDER BY pm.id",
        )?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(MemberOverview {
                    member: MemberRow::from_row(row)?,
                    teacher_name: row.get("teacher_name")?,
                    teacher_email: row.get("teacher_email")?,
                    department: row.get("department")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
