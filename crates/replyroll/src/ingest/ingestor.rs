use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::correlate::{correlate, Correlation, MatchMethod};
use crate::db::attachment_repo::{self, NewAttachment};
use crate::db::member_repo::{self, MemberStatus};
use crate::db::reply_repo::{self, NewReply};
use crate::db::{format_timestamp, Database, DatabaseError};
use crate::email::{parse_message, MailboxSource, ParsedMessage};
use crate::storage::AttachmentStore;

use super::guard::IngestLocks;
use super::IngestError;

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub fetched: usize,
    pub parse_failures: usize,
    pub duplicates: usize,
    pub matched_by_thread: usize,
    pub matched_by_sender: usize,
    pub unresolved: usize,
    pub ambiguous: usize,
    pub replies_stored: usize,
    pub attachments_stored: usize,
    /// Replies or attachments that matched but could not be persisted.
    pub persistence_failures: usize,
}

impl IngestSummary {
    pub fn matched(&self) -> usize {
        self.matched_by_thread + self.matched_by_sender
    }
}

/// Reads a mailbox and records every reply it can attribute.
pub struct ReplyIngestor {
    db: Database,
    store: AttachmentStore,
    locks: IngestLocks,
}

impl ReplyIngestor {
    pub fn new(db: Database, store: AttachmentStore, locks: IngestLocks) -> Self {
        Self { db, store, locks }
    }

    /// Fetches every message in the owner's inbox and processes them one at
    /// a time. Messages already stored are skipped, so re-running is safe.
    ///
    /// Only transport failures and an overlapping run for the same mailbox
    /// fail the run; per-message problems are logged and counted.
    pub async fn run(
        &self,
        owner_id: i64,
        mailbox: &mut dyn MailboxSource,
    ) -> Result<IngestSummary, IngestError> {
        let _guard = self
            .locks
            .try_acquire(owner_id)
            .ok_or(IngestError::AlreadyRunning { owner_id })?;

        self.fetch_and_process(owner_id, mailbox)
            .instrument(info_span!("ingest_run", owner_id))
            .await
    }

    async fn fetch_and_process(
        &self,
        owner_id: i64,
        mailbox: &mut dyn MailboxSource,
    ) -> Result<IngestSummary, IngestError> {
        let messages = mailbox.fetch_all().await?;
        info!("Fetched {} message(s) for owner {}", messages.len(), owner_id);

        let mut summary = IngestSummary {
            fetched: messages.len(),
            ..IngestSummary::default()
        };
        for raw in &messages {
            self.process_raw(raw, &mut summary);
        }

        info!(
            "Ingestion complete for owner {}: {} matched, {} duplicate, {} unresolved, {} ambiguous, {} unparseable",
            owner_id,
            summary.matched(),
            summary.duplicates,
            summary.unresolved,
            summary.ambiguous,
            summary.parse_failures
        );
        Ok(summary)
    }

    /// Parses, correlates and persists one raw message.
    pub fn process_raw(&self, raw: &[u8], summary: &mut IngestSummary) {
        let message = match parse_message(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping unparseable message: {}", e);
                summary.parse_failures += 1;
                return;
            }
        };

        let correlation = match correlate(&self.db, &message) {
            Ok(correlation) => correlation,
            Err(e) => {
                error!("Correlation lookup failed for {}: {}", message.message_id, e);
                summary.persistence_failures += 1;
                return;
            }
        };

        match correlation {
            Correlation::Duplicate => summary.duplicates += 1,
            Correlation::Unresolved(reason) => {
                info!(
                    "Dropping {} from {:?}: {:?}",
                    message.message_id, message.from, reason
                );
                summary.unresolved += 1;
            }
            Correlation::Ambiguous { candidates } => {
                info!(
                    "Dropping {} from {:?}: ambiguous between (project, teacher) {:?}",
                    message.message_id, message.from, candidates
                );
                summary.ambiguous += 1;
            }
            Correlation::Matched {
                project_id,
                teacher_id,
                method,
            } => {
                match method {
                    MatchMethod::Thread => summary.matched_by_thread += 1,
                    MatchMethod::Sender => summary.matched_by_sender += 1,
                }
                self.persist(&message, project_id, teacher_id, summary);
            }
        }
    }

    /// Stores the reply, its attachments and the membership update. These
    /// writes are independent; a failure part-way is logged and later steps
    /// still run where they can.
    fn persist(
        &self,
        message: &ParsedMessage,
        project_id: i64,
        teacher_id: i64,
        summary: &mut IngestSummary,
    ) {
        let received_at = format_timestamp(&message.received_at);
        let in_reply_to = message.in_reply_to.join(" ");

        let reply = NewReply {
            project_id,
            teacher_id,
            from_email: &message.from,
            subject: &message.subject,
            message_id: &message.message_id,
            in_reply_to: (!in_reply_to.is_empty()).then_some(in_reply_to.as_str()),
            received_at: &received_at,
            raw_headers: &message.headers,
            body_text: &message.body_text,
        };

        let reply_id = match reply_repo::insert(&self.db, &reply) {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!("{} was stored concurrently", message.message_id);
                summary.duplicates += 1;
                return;
            }
            Err(e) => {
                error!("Failed to store reply {}: {}", message.message_id, e);
                summary.persistence_failures += 1;
                return;
            }
        };
        summary.replies_stored += 1;

        for attachment in &message.attachments {
            let stored = match self.store.store(
                project_id,
                &attachment.filename,
                &attachment.content,
                &attachment.content_type,
            ) {
                Ok(stored) => stored,
                Err(e) => {
                    error!(
                        "Failed to store attachment {:?} of {}: {}",
                        attachment.filename, message.message_id, e
                    );
                    summary.persistence_failures += 1;
                    continue;
                }
            };

            let stored_path = stored.path.to_string_lossy();
            let record = NewAttachment {
                reply_id,
                project_id,
                teacher_id,
                filename: &attachment.filename,
                stored_path: &stored_path,
                content_type: &stored.content_type,
                size_bytes: stored.size_bytes,
            };
            match attachment_repo::insert(&self.db, &record) {
                Ok(_) => summary.attachments_stored += 1,
                Err(e) => {
                    error!(
                        "Stored {} but failed to record it for reply {}: {}",
                        stored.stored_name, message.message_id, e
                    );
                    summary.persistence_failures += 1;
                }
            }
        }

        match member_repo::mark_replied(&self.db, project_id, teacher_id, &received_at) {
            Ok(true) => debug!(
                "Membership ({}, {}) marked replied",
                project_id, teacher_id
            ),
            Ok(false) => warn!(
                "Reply {} stored but teacher {} has no membership in project {}",
                message.message_id, teacher_id, project_id
            ),
            Err(e) => {
                error!(
                    "Reply {} stored but membership ({}, {}) not updated, recompute its status: {}",
                    message.message_id, project_id, teacher_id, e
                );
                summary.persistence_failures += 1;
            }
        }
    }
}

/// Rebuilds a membership's reply state from the replies actually stored.
/// Returns `None` when the membership does not exist.
pub fn recompute_member_status(
    db: &Database,
    project_id: i64,
    teacher_id: i64,
) -> Result<Option<MemberStatus>, DatabaseError> {
    let latest = reply_repo::latest_received_at(db, project_id, teacher_id)?;
    let status = if latest.is_some() {
        MemberStatus::Replied
    } else {
        MemberStatus::Pending
    };

    if !member_repo::set_reply_state(db, project_id, teacher_id, status, latest.as_deref())? {
        return Ok(None);
    }

    Ok(member_repo::find(db, project_id, teacher_id)?.map(|m| m.effective_status()))
}
