//! IMAP client for reading a reply inbox.

use std::future::Future;
use std::net::ToSocketAddrs;
use std::time::Duration;

use async_imap::Session;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::config::ImapSettings;

use super::error::{EmailError, Result};

/// Type alias for the underlying async stream (using async-std compatible TcpStream).
type AsyncTcpStream = async_io::Async<std::net::TcpStream>;

/// Type alias for the TLS stream used by the IMAP session.
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

const INBOX: &str = "INBOX";

/// A source of raw inbound messages.
///
/// Implementations hold a live session while fetching, so futures are not
/// required to be `Send`.
#[async_trait(?Send)]
pub trait MailboxSource {
    /// Every message currently in the inbox, as raw RFC 5322 bytes.
    async fn fetch_all(&mut self) -> Result<Vec<Vec<u8>>>;
}

/// IMAP inbox reader. Messages are fetched with `BODY.PEEK[]` so their
/// seen flags are left alone.
pub struct ImapMailbox {
    session: Option<Session<TlsStream>>,
    settings: ImapSettings,
    username: String,
    password: SecretString,
    timeout: Duration,
}

impl ImapMailbox {
    pub fn new(
        settings: ImapSettings,
        username: &str,
        password: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            session: None,
            settings,
            username: username.to_string(),
            password,
            timeout,
        }
    }

    /// Connects to the IMAP server and authenticates.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!("Already connected to IMAP server");
            return Ok(());
        }

        if !self.settings.use_tls {
            return Err(EmailError::ConfigError(
                "TLS is required for secure email connections".to_string(),
            ));
        }

        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        info!("Connecting to IMAP server at {}", addr);

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| EmailError::ConnectionFailed(e.to_string()))?
            .next()
            .ok_or_else(|| {
                EmailError::ConnectionFailed(format!("{} did not resolve to an address", addr))
            })?;

        let std_stream = std::net::TcpStream::connect_timeout(&socket_addr, self.timeout)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    EmailError::Timeout(format!("connect to {}", addr))
                } else {
                    EmailError::ConnectionFailed(e.to_string())
                }
            })?;
        std_stream
            .set_nonblocking(true)
            .map_err(|e| EmailError::ConnectionFailed(e.to_string()))?;
        let tcp_stream = async_io::Async::new(std_stream)
            .map_err(|e| EmailError::ConnectionFailed(e.to_string()))?;

        let tls = TlsConnector::new();
        let tls_stream = with_timeout(
            self.timeout,
            "TLS handshake",
            tls.connect(&self.settings.host, tcp_stream),
        )
        .await??;

        let client = async_imap::Client::new(tls_stream);
        let session = with_timeout(
            self.timeout,
            "login",
            client.login(&self.username, self.password.expose_secret()),
        )
        .await?
        .map_err(|(e, _)| EmailError::AuthenticationFailed(e.to_string()))?;

        info!("Successfully authenticated to IMAP server");
        self.session = Some(session);
        Ok(())
    }

    /// Selects the inbox and returns its message count.
    pub async fn select_inbox(&mut self) -> Result<u32> {
        let timeout = self.timeout;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| EmailError::ConnectionFailed("Not connected".to_string()))?;

        let mailbox = with_timeout(timeout, "select", session.select(INBOX))
            .await?
            .map_err(|e| EmailError::ProtocolError(e.to_string()))?;

        debug!("{} holds {} message(s)", INBOX, mailbox.exists);
        Ok(mailbox.exists)
    }

    /// Fetches every message in the selected folder.
    pub async fn fetch_every_message(&mut self) -> Result<Vec<Vec<u8>>> {
        let timeout = self.timeout;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| EmailError::ConnectionFailed("Not connected".to_string()))?;

        let mut messages = with_timeout(timeout, "fetch", session.uid_fetch("1:*", "(UID BODY.PEEK[])"))
            .await?
            .map_err(|e| EmailError::ProtocolError(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(message_result) = with_timeout(timeout, "fetch", messages.next()).await? {
            match message_result {
                Ok(message) => match message.body() {
                    Some(body) => results.push(body.to_vec()),
                    None => warn!("Message UID {:?} has no body", message.uid),
                },
                Err(e) => {
                    warn!("Error fetching message: {}", e);
                }
            }
        }

        debug!("Successfully fetched {} emails", results.len());
        Ok(results)
    }

    /// Disconnects from the IMAP server gracefully.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            info!("Disconnecting from IMAP server");
            with_timeout(self.timeout, "logout", session.logout())
                .await?
                .map_err(|e| EmailError::ProtocolError(e.to_string()))?;
        }
        Ok(())
    }

    /// Checks if the client is currently connected.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

#[async_trait(?Send)]
impl MailboxSource for ImapMailbox {
    async fn fetch_all(&mut self) -> Result<Vec<Vec<u8>>> {
        self.connect().await?;

        let fetched = match self.select_inbox().await {
            Ok(0) => Ok(Vec::new()),
            Ok(_) => self.fetch_every_message().await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.disconnect().await {
            warn!("IMAP logout failed: {}", e);
            // the session is gone either way
            self.session = None;
        }

        fetched
    }
}

impl Drop for ImapMailbox {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("ImapMailbox dropped without explicit disconnect - session will be closed");
        }
    }
}

async fn with_timeout<F: Future>(limit: Duration, what: &str, future: F) -> Result<F::Output> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| EmailError::Timeout(format!("IMAP {} exceeded {:?}", what, limit)))
}
