//! Templated mail-outs run on a bounded background worker pool.

pub mod pool;
pub mod task;
pub mod template;

use thiserror::Error;

use crate::db::DatabaseError;

pub use pool::{DispatchPool, DispatchTicket};
pub use task::{DispatchContext, DispatchKind, DispatchReport, DispatchTask, TargetSelection};
pub use template::{render, TemplateVars};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Project {0} not found")]
    ProjectNotFound(i64),

    #[error("Dispatch queue is full")]
    QueueFull,

    #[error("Dispatch pool is shut down")]
    ChannelClosed,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
