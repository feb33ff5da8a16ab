//! Inbound message parsing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use mail_parser::{HeaderValue, Message, MessageParser, MessagePart, MimeHeaders, PartType};

use super::error::{EmailError, Result};
use super::message_id::{fallback_message_id, normalize_message_id};

/// An attachment lifted out of a reply. `filename` is the name the sender
/// gave it, not yet sanitized.
#[derive(Debug, Clone)]
pub struct ParsedAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// The fields of a reply that correlation and persistence need.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    /// Normalized Message-ID, or a content-derived fallback when absent.
    pub message_id: String,
    /// Normalized ids from `In-Reply-To`, in header order.
    pub in_reply_to: Vec<String>,
    /// Bare sender address, empty if the message had no usable `From:`.
    pub from: String,
    pub subject: String,
    /// `Date:` header, or the parse time if missing or invalid.
    pub received_at: DateTime<Utc>,
    /// Raw header values keyed by header name.
    pub headers: BTreeMap<String, Vec<String>>,
    pub body_text: String,
    pub attachments: Vec<ParsedAttachment>,
}

impl ParsedMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }
}

/// Parses a raw RFC 5322 message.
///
/// Fails only when the envelope itself is unreadable. Individual parts that
/// cannot be decoded are skipped with a warning.
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| EmailError::ParseError("Failed to parse email message".to_string()))?;

    if message.headers().is_empty() {
        return Err(EmailError::ParseError(
            "Message has no header fields".to_string(),
        ));
    }

    let message_id = match message.message_id().map(normalize_message_id) {
        Some(id) if !id.is_empty() => id,
        _ => {
            let id = fallback_message_id(raw);
            debug!("Message has no Message-ID, using {}", id);
            id
        }
    };

    let parsed = ParsedMessage {
        in_reply_to: in_reply_to_ids(&message),
        from: sender_address(&message),
        subject: message.subject().unwrap_or_default().to_string(),
        received_at: received_at(&message),
        headers: raw_headers(&message, raw),
        body_text: plain_body(&message),
        attachments: extract_attachments(&message, &message_id),
        message_id,
    };

    debug!(
        "Parsed message {} from {:?} with {} attachment(s)",
        parsed.message_id,
        parsed.from,
        parsed.attachments.len()
    );
    Ok(parsed)
}

fn in_reply_to_ids(message: &Message) -> Vec<String> {
    let values: Vec<String> = match message.in_reply_to() {
        HeaderValue::Text(id) => vec![id.to_string()],
        HeaderValue::TextList(ids) => ids.iter().map(|id| id.to_string()).collect(),
        _ => Vec::new(),
    };

    values
        .iter()
        .flat_map(|v| v.split_whitespace())
        .map(normalize_message_id)
        .filter(|id| !id.is_empty())
        .collect()
}

fn sender_address(message: &Message) -> String {
    message
        .from()
        .and_then(|addr| addr.first())
        .and_then(|addr| addr.address())
        .map(|a| a.trim().to_string())
        .unwrap_or_default()
}

fn received_at(message: &Message) -> DateTime<Utc> {
    message
        .date()
        .filter(|d| d.is_valid())
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now)
}

fn raw_headers(message: &Message, raw: &[u8]) -> BTreeMap<String, Vec<String>> {
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for header in message.headers() {
        let value = raw
            .get(header.offset_start as usize..header.offset_end as usize)
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .unwrap_or_default();
        headers
            .entry(header.name().to_string())
            .or_default()
            .push(value);
    }
    headers
}

fn plain_body(message: &Message) -> String {
    let mut parts = Vec::new();
    for part in message.text_bodies() {
        if let PartType::Text(text) = &part.body {
            parts.push(text.as_ref());
        }
    }
    parts.join("\n")
}

fn extract_attachments(message: &Message, message_id: &str) -> Vec<ParsedAttachment> {
    let mut attachments = Vec::new();

    for part in message.attachments() {
        let content = match &part.body {
            PartType::Binary(data) | PartType::InlineBinary(data) => data.to_vec(),
            PartType::Text(text) => text.as_bytes().to_vec(),
            PartType::Html(html) => html.as_bytes().to_vec(),
            PartType::Message(_) | PartType::Multipart(_) => {
                warn!(
                    "Skipping nested message part in {} (not a file attachment)",
                    message_id
                );
                continue;
            }
        };

        let content_type = content_type(part);
        let filename = attachment_filename(part, &content_type);

        debug!(
            "Found attachment: {} ({}, {} bytes)",
            filename,
            content_type,
            content.len()
        );

        attachments.push(ParsedAttachment {
            filename,
            content_type,
            content,
        });
    }

    attachments
}

fn content_type(part: &MessagePart) -> String {
    part.content_type()
        .map(|ct| {
            if let Some(subtype) = ct.subtype() {
                format!("{}/{}", ct.ctype(), subtype)
            } else {
                ct.ctype().to_string()
            }
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn attachment_filename(part: &MessagePart, content_type: &str) -> String {
    let raw_filename = part
        .attachment_name()
        .or_else(|| part.content_type().and_then(|ct| ct.attribute("name")))
        .map(|s| s.trim().to_string());

    match raw_filename {
        Some(name) if !name.is_empty() => name,
        _ => {
            let extension = mime_guess::get_mime_extensions_str(content_type)
                .and_then(|exts| exts.first().copied())
                .unwrap_or("bin");
            format!("attachment.{}", extension)
        }
    }
}
