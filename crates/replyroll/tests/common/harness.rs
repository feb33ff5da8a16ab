//! Test harness for isolated engine runs.
//!
//! Outbound mail is captured instead of sent, and the inbox is a shared
//! list of raw messages that tests push replies into.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use replyroll::db::project_repo::{self, NewProject};
use replyroll::db::{member_repo, teacher_repo};
use replyroll::email::error::Result as EmailResult;
use replyroll::email::ComposedMessage;
use replyroll::spreadsheet::write_workbook;
use replyroll::{Database, Engine, EngineSettings, MailSender, MailboxSource, TransportFactory};

/// Owner id used for every project the harness creates.
pub const OWNER_ID: i64 = 1;
pub const OWNER_ADDRESS: &str = "office@school.example";

type Outbox = Arc<Mutex<Vec<ComposedMessage>>>;
type Inbox = Arc<Mutex<Vec<Vec<u8>>>>;

struct CapturingSender {
    outbox: Outbox,
}

impl MailSender for CapturingSender {
    fn from_address(&self) -> &str {
        OWNER_ADDRESS
    }

    fn send(&self, message: &ComposedMessage) -> EmailResult<()> {
        self.outbox.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct SharedMailbox {
    inbox: Inbox,
}

#[async_trait(?Send)]
impl MailboxSource for SharedMailbox {
    async fn fetch_all(&mut self) -> EmailResult<Vec<Vec<u8>>> {
        Ok(self.inbox.lock().unwrap().clone())
    }
}

struct FakeTransports {
    outbox: Outbox,
    inbox: Inbox,
}

impl TransportFactory for FakeTransports {
    fn sender(&self, _owner_id: i64) -> EmailResult<Box<dyn MailSender>> {
        Ok(Box::new(CapturingSender {
            outbox: Arc::clone(&self.outbox),
        }))
    }

    fn mailbox(&self, _owner_id: i64) -> EmailResult<Box<dyn MailboxSource>> {
        Ok(Box::new(SharedMailbox {
            inbox: Arc::clone(&self.inbox),
        }))
    }
}

/// Isolated engine environment backed by a temp directory.
pub struct TestHarness {
    temp_dir: TempDir,
    pub engine: Engine,
    pub replies_dir: PathBuf,
    pub aggregated_dir: PathBuf,
    pub templates_dir: PathBuf,
    outbox: Outbox,
    inbox: Inbox,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let replies_dir = base.join("replies");
        let aggregated_dir = base.join("aggregated");
        let templates_dir = base.join("templates");
        std::fs::create_dir_all(&templates_dir).expect("Failed to create templates dir");

        let outbox: Outbox = Arc::default();
        let inbox: Inbox = Arc::default();
        let transports = Arc::new(FakeTransports {
            outbox: Arc::clone(&outbox),
            inbox: Arc::clone(&inbox),
        });

        let engine = Engine::new(
            Database::open_in_memory().expect("Failed to open database"),
            transports,
            EngineSettings {
                replies_directory: replies_dir.clone(),
                aggregated_directory: aggregated_dir.clone(),
                templates_directory: templates_dir.clone(),
                worker_count: 2,
                queue_capacity: 8,
            },
        );

        Self {
            temp_dir,
            engine,
            replies_dir,
            aggregated_dir,
            templates_dir,
            outbox,
            inbox,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db(&self) -> &Database {
        self.engine.database()
    }

    /// Creates an active project owned by [`OWNER_ID`].
    pub fn project(&self, code: &str, name: &str, template_file: Option<&str>) -> i64 {
        project_repo::insert(
            self.db(),
            &NewProject {
                code: code.to_string(),
                name: name.to_string(),
                subject_template: "{{project_name}} ({{project_code}})".to_string(),
                body_template: "Dear {{teacher_name}}, please fill in the attached sheet."
                    .to_string(),
                template_file: template_file.map(str::to_string),
                created_by: OWNER_ID,
            },
        )
        .expect("Failed to insert project")
    }

    pub fn teacher(&self, name: &str, email: &str) -> i64 {
        teacher_repo::insert(self.db(), name, email, None).expect("Failed to insert teacher")
    }

    pub fn member(&self, project_id: i64, teacher_id: i64) {
        member_repo::add(self.db(), project_id, teacher_id).expect("Failed to add member");
    }

    /// Writes a workbook into the templates directory.
    pub fn write_template(&self, filename: &str, rows: &[Vec<String>]) -> PathBuf {
        let path = self.templates_dir.join(filename);
        write_workbook(&path, "Sheet1", rows).expect("Failed to write template");
        path
    }

    /// Writes a workbook under the temp directory for use as a reply attachment.
    pub fn write_outgoing_workbook(&self, filename: &str, rows: &[Vec<String>]) -> PathBuf {
        let dir = self.temp_path().join("outgoing");
        std::fs::create_dir_all(&dir).expect("Failed to create outgoing dir");
        let path = dir.join(filename);
        write_workbook(&path, "Sheet1", rows).expect("Failed to write workbook");
        path
    }

    /// Writes arbitrary bytes under the temp directory for use as a reply
    /// attachment.
    pub fn write_outgoing_bytes(&self, filename: &str, content: &[u8]) -> PathBuf {
        let dir = self.temp_path().join("outgoing");
        std::fs::create_dir_all(&dir).expect("Failed to create outgoing dir");
        let path = dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write attachment");
        path
    }

    /// Puts a raw message into the inbox the engine fetches from.
    pub fn deliver(&self, raw: Vec<u8>) {
        self.inbox.lock().unwrap().push(raw);
    }

    /// Removes everything from the inbox.
    pub fn clear_inbox(&self) {
        self.inbox.lock().unwrap().clear();
    }

    /// Every message the engine has sent so far.
    pub fn sent(&self) -> Vec<ComposedMessage> {
        self.outbox.lock().unwrap().clone()
    }

    /// The latest message sent to `address`.
    pub fn sent_to(&self, address: &str) -> ComposedMessage {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == address)
            .unwrap_or_else(|| panic!("nothing was sent to {}", address))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
