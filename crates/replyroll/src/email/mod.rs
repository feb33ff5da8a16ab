//! Outbound composition and delivery, inbound fetching and parsing.

pub mod client;
pub mod compose;
pub mod error;
pub mod message_id;
pub mod parser;
pub mod smtp;
pub mod transport;

pub use client::{ImapMailbox, MailboxSource};
pub use compose::{ComposedMessage, MessageComposer};
pub use error::EmailError;
pub use message_id::{generate_message_id, normalize_message_id};
pub use parser::{parse_message, ParsedAttachment, ParsedMessage};
pub use smtp::{MailSender, SmtpMailer};
pub use transport::{AccountTransports, TransportFactory};
