//! Outgoing message construction.

use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use log::{debug, warn};

use super::error::{EmailError, Result};
use super::message_id::{generate_message_id, normalize_message_id};

/// A message ready for the SMTP transport.
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    /// Normalized id, as recorded in the sent ledger.
    pub message_id: String,
    pub to: String,
    pub subject: String,
    /// Name of the file actually attached, if any.
    pub attachment: Option<String>,
    pub message: Message,
}

impl ComposedMessage {
    /// The RFC 5322 bytes of the message.
    pub fn formatted(&self) -> Vec<u8> {
        self.message.formatted()
    }
}

/// Builds multipart messages from a fixed sender.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    from: Mailbox,
    from_address: String,
}

impl MessageComposer {
    pub fn new(from_address: &str) -> Result<Self> {
        let from: Mailbox = from_address
            .parse()
            .map_err(|e| EmailError::ComposeError(format!("invalid sender address: {}", e)))?;

        Ok(Self {
            from_address: from.email.to_string(),
            from,
        })
    }

    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    /// Builds a message with a plain-text body and an optional file.
    ///
    /// A file that cannot be read is logged and left out; the message is
    /// still produced.
    pub fn compose(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> Result<ComposedMessage> {
        let recipient: Mailbox = to.trim().parse().map_err(|e| {
            EmailError::ComposeError(format!("invalid recipient address '{}': {}", to, e))
        })?;

        let message_id = normalize_message_id(&generate_message_id(&self.from_address)?);

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(body.to_string()));
        let mut attached = None;

        if let Some(path) = attachment {
            if let Some((name, part)) = attachment_part(path) {
                multipart = multipart.singlepart(part);
                attached = Some(name);
            }
        }

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .message_id(Some(format!("<{}>", message_id)))
            .multipart(multipart)
            .map_err(|e| EmailError::ComposeError(e.to_string()))?;

        debug!(
            "Composed message {} to {} (attachment: {:?})",
            message_id, to, attached
        );

        Ok(ComposedMessage {
            message_id,
            to: to.trim().to_string(),
            subject: subject.to_string(),
            attachment: attached,
            message,
        })
    }
}

fn attachment_part(path: &Path) -> Option<(String, SinglePart)> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(
                "Could not read attachment {}, sending without it: {}",
                crate::sanitize::redact_path(path),
                e
            );
            return None;
        }
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| crate::sanitize::DEFAULT_ATTACHMENT_NAME.to_string());

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = match ContentType::parse(mime.essence_str()) {
        Ok(ct) => ct,
        Err(e) => {
            warn!("Unusable content type {} for {}: {}", mime, name, e);
            return None;
        }
    };

    let part = Attachment::new(name.clone()).body(bytes, content_type);
    Some((name, part))
}
