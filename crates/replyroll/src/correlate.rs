//! Matching an inbound reply to the project and teacher it answers.
//!
//! Order of checks:
//! 1. a reply with the same Message-ID is already stored: skip it;
//! 2. an `In-Reply-To` id found in the sent ledger decides the match;
//! 3. otherwise the sender address must belong to exactly one membership
//!    in an active project. No tie-breaking is attempted.

use log::debug;

use crate::db::{ledger_repo, member_repo, reply_repo, teacher_repo, Database, DatabaseError};
use crate::email::ParsedMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    /// `In-Reply-To` pointed at a message in the sent ledger.
    Thread,
    /// The sender had exactly one active membership.
    Sender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No teacher is registered under the sender address.
    UnknownSender,
    /// The sender is known but has no membership in an active project.
    NoActiveMembership,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// Already ingested.
    Duplicate,
    Matched {
        project_id: i64,
        teacher_id: i64,
        method: MatchMethod,
    },
    Unresolved(UnresolvedReason),
    /// More than one active membership fits the sender; `(project, teacher)`
    /// pairs in id order.
    Ambiguous { candidates: Vec<(i64, i64)> },
}

pub fn correlate(db: &Database, message: &ParsedMessage) -> Result<Correlation, DatabaseError> {
    if reply_repo::exists_by_message_id(db, &message.message_id)? {
        debug!("{} already ingested", message.message_id);
        return Ok(Correlation::Duplicate);
    }

    for parent in &message.in_reply_to {
        if let Some(entry) = ledger_repo::find_by_message_id(db, parent)? {
            debug!(
                "{} threads onto {} (project {}, teacher {})",
                message.message_id, parent, entry.project_id, entry.teacher_id
            );
            return Ok(Correlation::Matched {
                project_id: entry.project_id,
                teacher_id: entry.teacher_id,
                method: MatchMethod::Thread,
            });
        }
    }

    let teachers = teacher_repo::find_by_email(db, &message.from)?;
    if teachers.is_empty() {
        return Ok(Correlation::Unresolved(UnresolvedReason::UnknownSender));
    }

    let mut candidates = Vec::new();
    for teacher in &teachers {
        for project_id in member_repo::active_projects_for_teacher(db, teacher.id)? {
            candidates.push((project_id, teacher.id));
        }
    }
    candidates.sort_unstable();

    Ok(match candidates.as_slice() {
        [] => Correlation::Unresolved(UnresolvedReason::NoActiveMembership),
        [(project_id, teacher_id)] => Correlation::Matched {
            project_id: *project_id,
            teacher_id: *teacher_id,
            method: MatchMethod::Sender,
        },
        _ => Correlation::Ambiguous { candidates },
    })
}
