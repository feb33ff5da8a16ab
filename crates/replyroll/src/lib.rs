pub mod aggregate;
pub mod config;
pub mod correlate;
pub mod db;
pub mod dispatch;
pub mod email;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod sanitize;
pub mod scheduler;
pub mod secrets;
pub mod spreadsheet;
pub mod storage;
pub mod tracking;

pub use aggregate::{AggregateError, AggregateOutcome, Aggregator};
pub use config::{load_config, Config};
pub use correlate::{correlate, Correlation, MatchMethod, UnresolvedReason};
pub use db::{Database, DatabaseError};
pub use dispatch::{DispatchError, DispatchReport, DispatchTicket};
pub use email::{AccountTransports, EmailError, MailSender, MailboxSource, TransportFactory};
pub use engine::{Engine, EngineSettings};
pub use error::{ConfigError, ReplyrollError, Result, StorageError};
pub use ingest::{IngestError, IngestSummary};
pub use scheduler::IngestScheduler;
pub use secrets::{resolve_secret, SecretError, SecretSource};
pub use tracking::{MemberTracking, ProjectTracking};
