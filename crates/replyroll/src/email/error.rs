//! Mail transport and parsing error types.

use thiserror::Error;

/// Errors that can occur while composing, sending, fetching or parsing mail.
#[derive(Error, Debug)]
pub enum EmailError {
    /// Failed to connect to the mail server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS/SSL error during connection.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No usable password for the account.
    #[error("Credentials not found: {0}")]
    CredentialsNotFound(String),

    /// IMAP protocol error.
    #[error("IMAP protocol error: {0}")]
    ProtocolError(String),

    /// The SMTP server rejected or failed the delivery.
    #[error("SMTP send failed: {0}")]
    SendFailed(String),

    /// The outgoing message could not be built.
    #[error("Failed to compose message: {0}")]
    ComposeError(String),

    /// Failed to parse an inbound message envelope.
    #[error("Failed to parse email: {0}")]
    ParseError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EmailError {
    /// Whether the error came from talking to a mail server (connect, TLS,
    /// auth, protocol, delivery or timeout).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EmailError::ConnectionFailed(_)
                | EmailError::TlsError(_)
                | EmailError::AuthenticationFailed(_)
                | EmailError::ProtocolError(_)
                | EmailError::SendFailed(_)
                | EmailError::Timeout(_)
        )
    }
}

impl From<async_native_tls::Error> for EmailError {
    fn from(err: async_native_tls::Error) -> Self {
        EmailError::TlsError(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for EmailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        if err.is_timeout() {
            EmailError::Timeout(err.to_string())
        } else if err.is_tls() {
            EmailError::TlsError(err.to_string())
        } else {
            EmailError::SendFailed(err.to_string())
        }
    }
}

/// Result type for email operations.
pub type Result<T> = std::result::Result<T, EmailError>;
