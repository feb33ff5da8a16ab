//! Reply ingestion: fetch, parse, correlate and persist.

pub mod guard;
pub mod ingestor;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::email::EmailError;

pub use guard::{IngestLocks, RunGuard};
pub use ingestor::{recompute_member_status, IngestSummary, ReplyIngestor};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("An ingestion run is already in progress for mailbox owner {owner_id}")]
    AlreadyRunning { owner_id: i64 },

    #[error("Mail transport error: {0}")]
    Transport(#[from] EmailError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
