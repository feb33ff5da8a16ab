//! Dispatch and reminder runs through the engine facade.

mod common;

use std::time::Duration;

use common::{row, ReplyBuilder, TestHarness};
use replyroll::db::member_repo::MemberStatus;
use replyroll::db::{dispatch_repo, ledger_repo};
use replyroll::DispatchError;

const WAIT: Duration = Duration::from_secs(10);

#[test]
fn test_dispatch_defaults_to_unsent_members() {
    let h = TestHarness::new();
    h.write_template("survey.xlsx", &[row(&["Name", "Score"])]);
    let project = h.project("GR-1", "Grades", Some("survey.xlsx"));
    let ann = h.teacher("Ann Lee", "ann@school.example");
    let bob = h.teacher("Bob Ray", "bob@school.example");
    assert_eq!(h.engine.add_members(project, &[ann, bob, ann]).unwrap(), 2);

    let ticket = h.engine.dispatch(project, &[]).unwrap();
    assert_eq!(ticket.queued, 2);
    let report = ticket.wait_timeout(WAIT).expect("dispatch did not finish");
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 0);

    let to_ann = h.sent_to("ann@school.example");
    assert_eq!(to_ann.subject, "Grades (GR-1)");
    assert_eq!(to_ann.attachment.as_deref(), Some("survey.xlsx"));
    let body = String::from_utf8_lossy(&to_ann.formatted()).into_owned();
    assert!(body.contains("Dear Ann Lee"));

    let ledger = ledger_repo::list_for_project(h.db(), project).unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().any(|e| e.message_id == to_ann.message_id && e.teacher_id == ann));

    let tracking = h.engine.tracking(project).unwrap();
    assert!(tracking
        .members
        .iter()
        .all(|m| m.status == MemberStatus::Sent && m.sent_at.is_some()));

    let audit = dispatch_repo::list_for_project(h.db(), project).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].target_type, "pending_members");
    assert_eq!(audit[0].sent_count, 2);

    // Everyone has been mailed, so a second default dispatch has nothing to do.
    let again = h.engine.dispatch(project, &[]).unwrap();
    assert_eq!(again.queued, 0);
    assert_eq!(again.wait().unwrap().attempted, 0);
    assert_eq!(h.sent().len(), 2);
}

#[test]
fn test_dispatch_to_selected_teachers() {
    let h = TestHarness::new();
    let project = h.project("GR-2", "Grades", None);
    let ann = h.teacher("Ann Lee", "ann@school.example");
    let bob = h.teacher("Bob Ray", "bob@school.example");
    h.member(project, ann);
    h.member(project, bob);

    let report = h
        .engine
        .dispatch(project, &[bob])
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(h.sent().len(), 1);
    assert_eq!(h.sent()[0].to, "bob@school.example");
    assert_eq!(h.sent()[0].attachment, None);

    let audit = dispatch_repo::list_for_project(h.db(), project).unwrap();
    assert_eq!(audit[0].target_type, "selected_members");
}

#[test]
fn test_dispatch_unknown_project() {
    let h = TestHarness::new();
    let err = h.engine.dispatch(404, &[]).unwrap_err();
    assert!(matches!(err, DispatchError::ProjectNotFound(404)));
}

#[test]
fn test_missing_teacher_is_skipped() {
    let h = TestHarness::new();
    let project = h.project("GR-3", "Grades", None);
    let ann = h.teacher("Ann Lee", "ann@school.example");

    let report = h
        .engine
        .dispatch(project, &[ann, 9999])
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.sent, 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_reminders_go_to_members_without_reply() {
    let h = TestHarness::new();
    let project = h.project("GR-4", "Grades", None);
    let ann = h.teacher("Ann Lee", "ann@school.example");
    let bob = h.teacher("Bob Ray", "bob@school.example");
    h.engine.add_members(project, &[ann, bob]).unwrap();
    h.engine
        .dispatch(project, &[])
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();

    let original = h.sent_to("ann@school.example");
    h.deliver(
        ReplyBuilder::from("ann@school.example")
            .in_reply_to(&original.message_id)
            .build(),
    );
    let summary = h.engine.ingest_replies(common::harness::OWNER_ID).await.unwrap();
    assert_eq!(summary.matched_by_thread, 1);

    let bob_sent_at = h
        .engine
        .tracking(project)
        .unwrap()
        .members
        .iter()
        .find(|m| m.teacher_id == bob)
        .and_then(|m| m.sent_at.clone());

    let report = h
        .engine
        .send_reminders(project, &[])
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();
    assert_eq!(report.sent, 1);

    let reminder = h.sent().last().cloned().unwrap();
    assert_eq!(reminder.to, "bob@school.example");
    assert!(reminder.subject.starts_with("Reminder: "));
    assert_eq!(reminder.attachment, None);

    // Reminders are threadable but leave the first-send time alone.
    assert_eq!(ledger_repo::list_for_project(h.db(), project).unwrap().len(), 3);
    let tracking = h.engine.tracking(project).unwrap();
    let bob_row = tracking.members.iter().find(|m| m.teacher_id == bob).unwrap();
    assert_eq!(bob_row.sent_at, bob_sent_at);
    assert_eq!(tracking.replied, 1);

    let audit = dispatch_repo::list_for_project(h.db(), project).unwrap();
    assert_eq!(audit.last().unwrap().target_type, "reminder_pending");
}

#[tokio::test]
async fn test_selected_reminders_skip_replied_and_non_members() {
    let h = TestHarness::new();
    let project = h.project("GR-5", "Grades", None);
    let ann = h.teacher("Ann Lee", "ann@school.example");
    let bob = h.teacher("Bob Ray", "bob@school.example");
    let cyd = h.teacher("Cyd Oak", "cyd@school.example");
    h.engine.add_members(project, &[ann, bob]).unwrap();
    h.engine
        .dispatch(project, &[])
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();

    h.deliver(ReplyBuilder::from("ann@school.example").build());
    h.engine.ingest_replies(common::harness::OWNER_ID).await.unwrap();
    let mailed_before = h.sent().len();

    let ticket = h.engine.send_reminders(project, &[ann, bob, cyd]).unwrap();
    assert_eq!(ticket.queued, 1);
    assert_eq!(ticket.wait_timeout(WAIT).unwrap().sent, 1);

    let reminders = &h.sent()[mailed_before..];
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].to, "bob@school.example");

    let only_replied = h.engine.send_reminders(project, &[ann]).unwrap();
    assert_eq!(only_replied.queued, 0);
    assert_eq!(only_replied.wait().unwrap().sent, 0);
    assert_eq!(h.sent().len(), mailed_before + 1);

    let audit = dispatch_repo::list_for_project(h.db(), project).unwrap();
    assert_eq!(audit.last().unwrap().target_type, "reminder_selected");
}
