//! Builders for raw inbound messages and sheet rows.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use replyroll::email::MessageComposer;

use super::harness::OWNER_ADDRESS;

/// Turns string literals into a sheet row.
pub fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

/// Builder for a reply as the mail server would hand it over.
pub struct ReplyBuilder {
    from: String,
    subject: String,
    body: String,
    in_reply_to: Option<String>,
    attachment: Option<std::path::PathBuf>,
}

impl ReplyBuilder {
    pub fn from(address: &str) -> Self {
        Self {
            from: address.to_string(),
            subject: "Re: survey".to_string(),
            body: "Please find the sheet attached.".to_string(),
            in_reply_to: None,
            attachment: None,
        }
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    /// Threads the reply onto an outbound message id (without brackets).
    pub fn in_reply_to(mut self, message_id: &str) -> Self {
        self.in_reply_to = Some(message_id.to_string());
        self
    }

    pub fn attach(mut self, path: &Path) -> Self {
        self.attachment = Some(path.to_path_buf());
        self
    }

    pub fn build(self) -> Vec<u8> {
        let composer = MessageComposer::new(&self.from).expect("invalid sender address");
        let composed = composer
            .compose(
                OWNER_ADDRESS,
                &self.subject,
                &self.body,
                self.attachment.as_deref(),
            )
            .expect("Failed to compose reply");

        let mut raw = Vec::new();
        if let Some(parent) = self.in_reply_to {
            raw.extend_from_slice(format!("In-Reply-To: <{}>\r\n", parent).as_bytes());
        }
        raw.extend_from_slice(&composed.formatted());
        raw
    }
}

/// A reply whose attachment is declared with `filename` verbatim. The
/// attachment body is the ZIP local-file signature.
pub fn raw_reply_with_named_attachment(message_id: &str, from: &str, filename: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\n\
Subject: Re: survey\r\n\
Message-ID: <{message_id}>\r\n\
Date: Tue, 14 Nov 2023 22:13:20 +0000\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\r\n\
--B\r\nContent-Type: text/plain\r\n\r\nattached\r\n\
--B\r\nContent-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"{filename}\"\r\n\
Content-Transfer-Encoding: base64\r\n\r\nUEsDBA==\r\n--B--\r\n"
    )
    .into_bytes()
}

/// A workbook archive holding nothing but `xl/worksheets/sheet1.xml`.
pub fn sheet_only_workbook(sheet_xml: &str) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("xl/worksheets/sheet1.xml", SimpleFileOptions::default())
        .expect("Failed to start sheet entry");
    zip.write_all(sheet_xml.as_bytes())
        .expect("Failed to write sheet entry");
    zip.finish().expect("Failed to finish archive").into_inner()
}
