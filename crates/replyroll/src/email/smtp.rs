//! SMTP delivery.

use std::time::Duration;

use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use log::{debug, info};
use secrecy::{ExposeSecret, SecretString};

use crate::config::SmtpSettings;

use super::compose::ComposedMessage;
use super::error::{EmailError, Result};

/// Something that can deliver composed messages.
pub trait MailSender: Send {
    /// The `From:` address outgoing messages carry.
    fn from_address(&self) -> &str;

    fn send(&self, message: &ComposedMessage) -> Result<()>;
}

/// Authenticated SMTP submission over implicit TLS or STARTTLS.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(
        settings: &SmtpSettings,
        username: &str,
        password: &SecretString,
        from_address: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if settings.host.trim().is_empty() {
            return Err(EmailError::ConfigError("SMTP host is empty".to_string()));
        }

        let builder = if settings.implicit_tls {
            SmtpTransport::relay(&settings.host)
        } else {
            SmtpTransport::starttls_relay(&settings.host)
        }
        .map_err(|e| EmailError::TlsError(e.to_string()))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(
                username.to_string(),
                password.expose_secret().to_string(),
            ))
            .timeout(Some(timeout))
            .build();

        info!(
            "SMTP transport ready for {}:{} ({})",
            settings.host,
            settings.port,
            if settings.implicit_tls {
                "implicit TLS"
            } else {
                "STARTTLS"
            }
        );

        Ok(Self {
            transport,
            from_address: from_address.to_string(),
        })
    }
}

impl MailSender for SmtpMailer {
    fn from_address(&self) -> &str {
        &self.from_address
    }

    fn send(&self, message: &ComposedMessage) -> Result<()> {
        debug!("Sending {} to {}", message.message_id, message.to);
        self.transport.send(&message.message)?;
        Ok(())
    }
}
