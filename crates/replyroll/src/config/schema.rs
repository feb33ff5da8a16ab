use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::secrets::SecretSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// SQLite database file. Defaults to `~/.replyroll/data/replyroll.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    /// Root for stored reply attachments, aggregated workbooks and
    /// dispatch templates.
    #[serde(default = "default_upload_directory")]
    pub upload_directory: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_ingest_interval_secs")]
    pub ingest_interval_secs: u64,
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

fn default_upload_directory() -> String {
    "./uploads".to_string()
}

fn default_worker_count() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    64
}

fn default_ingest_interval_secs() -> u64 {
    600
}

fn default_network_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            upload_directory: default_upload_directory(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            ingest_interval_secs: default_ingest_interval_secs(),
            network_timeout_secs: default_network_timeout_secs(),
            logging: LoggingConfig::default(),
            accounts: Vec::new(),
        }
    }
}

impl Config {
    pub fn replies_directory(&self) -> PathBuf {
        PathBuf::from(&self.upload_directory).join("replies")
    }

    pub fn aggregated_directory(&self) -> PathBuf {
        PathBuf::from(&self.upload_directory).join("aggregated")
    }

    pub fn templates_directory(&self) -> PathBuf {
        PathBuf::from(&self.upload_directory).join("templates")
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_interval_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn account(&self, owner_id: i64) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.owner_id == owner_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Mail credentials of one request owner. Outbound mail for the owner's
/// requests goes through `smtp`; replies are read from the `imap` inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub owner_id: i64,
    /// Address used in `From:` and as the Message-ID domain source.
    pub email_address: String,
    /// Login name; defaults to `email_address`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub smtp: SmtpSettings,
    pub imap: ImapSettings,
    #[serde(flatten)]
    pub password: SecretSource,
}

impl AccountConfig {
    pub fn login(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.email_address)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// `true` for implicit TLS (SMTPS), `false` for STARTTLS.
    #[serde(default = "default_true")]
    pub implicit_tls: bool,
}

fn default_smtp_port() -> u16 {
    465
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImapSettings {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

fn default_imap_port() -> u16 {
    993
}
