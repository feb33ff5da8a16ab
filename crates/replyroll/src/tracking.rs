//! Per-project reply tracking summary.

use serde::Serialize;

use crate::db::member_repo::{self, MemberStatus};
use crate::db::{Database, DatabaseError};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberTracking {
    pub teacher_id: i64,
    pub teacher_name: String,
    pub teacher_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(serialize_with = "serialize_status")]
    pub status: MemberStatus,
    pub sent_at: Option<String>,
    pub last_reply_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTracking {
    pub project_id: i64,
    pub members: Vec<MemberTracking>,
    pub total: usize,
    pub replied: usize,
}

fn serialize_status<S: serde::Serializer>(
    status: &MemberStatus,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(status.as_str())
}

pub fn project_tracking(db: &Database, project_id: i64) -> Result<ProjectTracking, DatabaseError> {
    let members: Vec<MemberTracking> = member_repo::list_for_project(db, project_id)?
        .into_iter()
        .map(|overview| MemberTracking {
            teacher_id: overview.member.teacher_id,
            status: overview.member.effective_status(),
            teacher_name: overview.teacher_name,
            teacher_email: overview.teacher_email,
            department: overview.department,
            sent_at: overview.member.sent_at,
            last_reply_at: overview.member.last_reply_at,
        })
        .collect();

    let replied = members
        .iter()
        .filter(|m| m.status == MemberStatus::Replied)
        .count();

    Ok(ProjectTracking {
        project_id,
        total: members.len(),
        replied,
        members,
    })
}
