//! Facade over dispatch, ingestion and aggregation for one database.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::aggregate::{AggregateError, AggregateOutcome, Aggregator};
use crate::config::Config;
use crate::db::member_repo::{self, MemberStatus};
use crate::db::{project_repo, Database, DatabaseError};
use crate::dispatch::{
    DispatchContext, DispatchError, DispatchKind, DispatchPool, DispatchReport, DispatchTask,
    DispatchTicket, TargetSelection,
};
use crate::email::{AccountTransports, TransportFactory};
use crate::ingest::{self, IngestError, IngestLocks, IngestSummary, ReplyIngestor};
use crate::storage::AttachmentStore;
use crate::tracking::{self, ProjectTracking};

/// Directories and pool sizing for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub replies_directory: PathBuf,
    pub aggregated_directory: PathBuf,
    pub templates_directory: PathBuf,
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            replies_directory: config.replies_directory(),
            aggregated_directory: config.aggregated_directory(),
            templates_directory: config.templates_directory(),
            worker_count: config.worker_count,
            queue_capacity: config.queue_capacity,
        }
    }
}

pub struct Engine {
    db: Database,
    transports: Arc<dyn TransportFactory>,
    pool: Mutex<Option<DispatchPool>>,
    ingestor: ReplyIngestor,
    aggregator: Aggregator,
}

impl Engine {
    pub fn new(db: Database, transports: Arc<dyn TransportFactory>, settings: EngineSettings) -> Self {
        let pool = DispatchPool::new(
            DispatchContext {
                db: db.clone(),
                transports: Arc::clone(&transports),
                templates_directory: settings.templates_directory,
            },
            settings.worker_count,
            settings.queue_capacity,
        );

        Self {
            ingestor: ReplyIngestor::new(
                db.clone(),
                AttachmentStore::new(settings.replies_directory),
                IngestLocks::new(),
            ),
            aggregator: Aggregator::new(db.clone(), settings.aggregated_directory),
            pool: Mutex::new(Some(pool)),
            transports,
            db,
        }
    }

    /// Engine with SMTP/IMAP transports for the configured accounts.
    pub fn from_config(db: Database, config: &Config) -> Self {
        Self::new(
            db,
            Arc::new(AccountTransports::from_config(config)),
            EngineSettings::from_config(config),
        )
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Adds teachers to a project. Existing members are left alone; returns
    /// how many were newly added.
    pub fn add_members(&self, project_id: i64, teacher_ids: &[i64]) -> Result<usize, DatabaseError> {
        let mut added = 0;
        for &teacher_id in teacher_ids {
            if member_repo::add(&self.db, project_id, teacher_id)? {
                added += 1;
            }
        }
        debug!("Added {} member(s) to project {}", added, project_id);
        Ok(added)
    }

    /// Queues the project mail for `teacher_ids`, or for every member not yet
    /// mailed when the list is empty. Returns at once; the ticket's `queued`
    /// is the number of recipients.
    pub fn dispatch(
        &self,
        project_id: i64,
        teacher_ids: &[i64],
    ) -> Result<DispatchTicket, DispatchError> {
        self.queue(project_id, teacher_ids, DispatchKind::Initial)
    }

    /// Queues a reminder for every member still pending a reply, narrowed to
    /// `teacher_ids` when the list is not empty. Members who already replied
    /// and non-members are never reminded.
    pub fn send_reminders(
        &self,
        project_id: i64,
        teacher_ids: &[i64],
    ) -> Result<DispatchTicket, DispatchError> {
        self.queue(project_id, teacher_ids, DispatchKind::Reminder)
    }

    fn queue(
        &self,
        project_id: i64,
        teacher_ids: &[i64],
        kind: DispatchKind,
    ) -> Result<DispatchTicket, DispatchError> {
        if project_repo::find_by_id(&self.db, project_id)?.is_none() {
            return Err(DispatchError::ProjectNotFound(project_id));
        }

        let (teacher_ids, selection) = if teacher_ids.is_empty() {
            let defaults = match kind {
                DispatchKind::Initial => member_repo::pending_dispatch_targets(&self.db, project_id)?,
                DispatchKind::Reminder => member_repo::pending_reply_targets(&self.db, project_id)?,
            };
            (defaults, TargetSelection::Default)
        } else {
            let selected = match kind {
                DispatchKind::Initial => teacher_ids.to_vec(),
                // an explicit list only narrows the members still pending a reply
                DispatchKind::Reminder => {
                    let pending = member_repo::pending_reply_targets(&self.db, project_id)?;
                    let (kept, dropped): (Vec<i64>, Vec<i64>) =
                        teacher_ids.iter().copied().partition(|id| pending.contains(id));
                    if !dropped.is_empty() {
                        debug!(
                            "Not reminding {:?} in project {}: not pending a reply",
                            dropped, project_id
                        );
                    }
                    kept
                }
            };
            (selected, TargetSelection::Selected)
        };

        if teacher_ids.is_empty() {
            info!("No {} targets for project {}", kind.as_str(), project_id);
            return Ok(DispatchTicket::completed(DispatchReport {
                project_id,
                ..DispatchReport::default()
            }));
        }

        let pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        let pool = pool.as_ref().ok_or(DispatchError::ChannelClosed)?;
        let ticket = pool.submit(DispatchTask {
            project_id,
            teacher_ids,
            kind,
            selection,
        })?;

        info!(
            "Queued {} {} mail(s) for project {}",
            ticket.queued,
            kind.as_str(),
            project_id
        );
        Ok(ticket)
    }

    /// Fetches the owner's inbox and records every reply that can be
    /// attributed. Rejects a second concurrent run for the same mailbox.
    pub async fn ingest_replies(&self, owner_id: i64) -> Result<IngestSummary, IngestError> {
        let mut mailbox = self.transports.mailbox(owner_id)?;
        self.ingestor.run(owner_id, mailbox.as_mut()).await
    }

    pub fn aggregate(&self, project_id: i64) -> Result<AggregateOutcome, AggregateError> {
        self.aggregator.aggregate(project_id)
    }

    /// Location of the project's aggregated workbook. The file exists only
    /// after a successful [`aggregate`](Self::aggregate).
    pub fn aggregated_file_path(&self, project_id: i64) -> PathBuf {
        self.aggregator.output_path(project_id)
    }

    pub fn tracking(&self, project_id: i64) -> Result<ProjectTracking, DatabaseError> {
        tracking::project_tracking(&self.db, project_id)
    }

    pub fn recompute_member_status(
        &self,
        project_id: i64,
        teacher_id: i64,
    ) -> Result<Option<MemberStatus>, DatabaseError> {
        ingest::recompute_member_status(&self.db, project_id, teacher_id)
    }

    /// Stops accepting dispatch work and waits for running tasks to finish.
    pub fn shutdown(&self) {
        let pool = self.pool.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pool) = pool {
            pool.wait();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
