//! One background dispatch run: render, compose, send and record, recipient
//! by recipient.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use crate::db::project_repo::{self, ProjectRow};
use crate::db::{dispatch_repo, ledger_repo, member_repo, now_timestamp, teacher_repo, Database};
use crate::email::{MailSender, MessageComposer, TransportFactory};

use super::template::{self, TemplateVars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// First mail of a project, with the spreadsheet template attached.
    Initial,
    /// Follow-up to members who have not replied; no attachment.
    Reminder,
}

impl DispatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchKind::Initial => "initial",
            DispatchKind::Reminder => "reminder",
        }
    }
}

/// How the recipients of a task were chosen, as recorded in the dispatch audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSelection {
    /// Every member not yet mailed (initial) or not yet replied (reminder).
    Default,
    /// An explicit list from the caller.
    Selected,
}

#[derive(Debug, Clone)]
pub struct DispatchTask {
    pub project_id: i64,
    pub teacher_ids: Vec<i64>,
    pub kind: DispatchKind,
    pub selection: TargetSelection,
}

impl DispatchTask {
    /// Value stored in `dispatches.target_type`.
    pub fn target_type(&self) -> &'static str {
        match (self.kind, self.selection) {
            (DispatchKind::Initial, TargetSelection::Default) => "pending_members",
            (DispatchKind::Initial, TargetSelection::Selected) => "selected_members",
            (DispatchKind::Reminder, TargetSelection::Default) => "reminder_pending",
            (DispatchKind::Reminder, TargetSelection::Selected) => "reminder_selected",
        }
    }
}

/// Outcome of a finished task. `sent` counts messages the SMTP server
/// accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub project_id: i64,
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Recipients with no teacher record.
    pub skipped: usize,
}

/// What a worker needs to execute tasks.
#[derive(Clone)]
pub struct DispatchContext {
    pub db: Database,
    pub transports: Arc<dyn TransportFactory>,
    /// Directory project spreadsheet templates are resolved against.
    pub templates_directory: PathBuf,
}

/// Runs a task to completion. Individual send failures are logged and
/// counted; they never stop the remaining recipients.
pub fn run_task(ctx: &DispatchContext, task: &DispatchTask) -> DispatchReport {
    let _span = info_span!(
        "dispatch_task",
        project_id = task.project_id,
        kind = task.kind.as_str()
    )
    .entered();

    let mut report = DispatchReport {
        project_id: task.project_id,
        attempted: task.teacher_ids.len(),
        ..DispatchReport::default()
    };

    let project = match project_repo::find_by_id(&ctx.db, task.project_id) {
        Ok(Some(project)) => project,
        Ok(None) => {
            error!("Project {} disappeared before dispatch", task.project_id);
            report.failed = report.attempted;
            return report;
        }
        Err(e) => {
            error!("Failed to load project {}: {}", task.project_id, e);
            report.failed = report.attempted;
            return report;
        }
    };

    let sender = match ctx.transports.sender(project.created_by) {
        Ok(sender) => sender,
        Err(e) => {
            error!(
                "No usable mail account for owner {}, aborting dispatch: {}",
                project.created_by, e
            );
            report.failed = report.attempted;
            return report;
        }
    };

    let composer = match MessageComposer::new(sender.from_address()) {
        Ok(composer) => composer,
        Err(e) => {
            error!("Cannot compose mail from {}: {}", sender.from_address(), e);
            report.failed = report.attempted;
            return report;
        }
    };

    let attachment = match task.kind {
        DispatchKind::Initial => project
            .template_file
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(|f| ctx.templates_directory.join(f)),
        DispatchKind::Reminder => None,
    };

    info!(
        "Starting {} run for project {} ({} targets)",
        task.kind.as_str(),
        project.id,
        task.teacher_ids.len()
    );

    for &teacher_id in &task.teacher_ids {
        let outcome = send_one(
            ctx,
            task.kind,
            &project,
            teacher_id,
            sender.as_ref(),
            &composer,
            attachment.as_deref(),
        );
        match outcome {
            SendOutcome::Sent => report.sent += 1,
            SendOutcome::Failed => report.failed += 1,
            SendOutcome::Skipped => report.skipped += 1,
        }
    }

    if let Err(e) = dispatch_repo::insert(&ctx.db, project.id, task.target_type(), report.sent) {
        error!("Failed to record dispatch for project {}: {}", project.id, e);
    }

    info!(
        "{} run for project {} finished: {}/{} succeeded",
        task.kind.as_str(),
        project.id,
        report.sent,
        report.attempted
    );
    report
}

enum SendOutcome {
    Sent,
    Failed,
    Skipped,
}

fn send_one(
    ctx: &DispatchContext,
    kind: DispatchKind,
    project: &ProjectRow,
    teacher_id: i64,
    sender: &dyn MailSender,
    composer: &MessageComposer,
    attachment: Option<&std::path::Path>,
) -> SendOutcome {
    let teacher = match teacher_repo::find_by_id(&ctx.db, teacher_id) {
        Ok(Some(teacher)) => teacher,
        Ok(None) => {
            warn!("Teacher {} not found, skipping", teacher_id);
            return SendOutcome::Skipped;
        }
        Err(e) => {
            error!("Failed to load teacher {}: {}", teacher_id, e);
            return SendOutcome::Failed;
        }
    };

    match member_repo::find(&ctx.db, project.id, teacher_id) {
        Ok(Some(_)) => {}
        Ok(None) => warn!(
            "Teacher {} is not a member of project {}, sending anyway",
            teacher_id, project.id
        ),
        Err(e) => warn!("Membership lookup failed for teacher {}: {}", teacher_id, e),
    }

    let vars = TemplateVars {
        teacher_name: &teacher.name,
        project_name: &project.name,
        project_code: &project.code,
    };
    let subject = template::render(&project.subject_template, &vars);
    let body = template::render(&project.body_template, &vars);
    let (subject, body) = match kind {
        DispatchKind::Initial => (subject, body),
        DispatchKind::Reminder => (
            template::reminder_subject(&subject),
            template::reminder_body(&vars, &body),
        ),
    };

    let message = match composer.compose(&teacher.email, &subject, &body, attachment) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                "Failed to compose mail for {} ({}): {}",
                teacher.name, teacher.email, e
            );
            return SendOutcome::Failed;
        }
    };

    if let Err(e) = sender.send(&message) {
        warn!("Failed to send to {} ({}): {}", teacher.name, teacher.email, e);
        return SendOutcome::Failed;
    }

    if let Err(e) = ledger_repo::append(&ctx.db, project.id, teacher_id, &message.message_id) {
        error!(
            "Sent {} to teacher {} but failed to record it: {}",
            message.message_id, teacher_id, e
        );
    }

    if kind == DispatchKind::Initial {
        if let Err(e) = member_repo::mark_sent(&ctx.db, project.id, teacher_id, &now_timestamp()) {
            error!("Failed to mark teacher {} as sent: {}", teacher_id, e);
        }
    }

    debug!("Sent {} to {}", message.message_id, teacher.email);
    SendOutcome::Sent
}
