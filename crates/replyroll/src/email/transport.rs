//! Per-account transport construction.

use std::time::Duration;

use log::debug;

use crate::config::{AccountConfig, Config};

use super::client::{ImapMailbox, MailboxSource};
use super::error::{EmailError, Result};
use super::smtp::{MailSender, SmtpMailer};

/// Hands out mail transports for a request owner's account.
pub trait TransportFactory: Send + Sync {
    fn sender(&self, owner_id: i64) -> Result<Box<dyn MailSender>>;

    fn mailbox(&self, owner_id: i64) -> Result<Box<dyn MailboxSource>>;
}

/// Builds SMTP and IMAP transports from configured accounts.
#[derive(Debug, Clone)]
pub struct AccountTransports {
    accounts: Vec<AccountConfig>,
    timeout: Duration,
}

impl AccountTransports {
    pub fn new(accounts: Vec<AccountConfig>, timeout: Duration) -> Self {
        Self { accounts, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.accounts.clone(), config.network_timeout())
    }

    fn account(&self, owner_id: i64) -> Result<&AccountConfig> {
        self.accounts
            .iter()
            .find(|a| a.owner_id == owner_id)
            .ok_or_else(|| {
                EmailError::ConfigError(format!("No mail account configured for owner {}", owner_id))
            })
    }
}

impl TransportFactory for AccountTransports {
    fn sender(&self, owner_id: i64) -> Result<Box<dyn MailSender>> {
        let account = self.account(owner_id)?;
        let password = account
            .password
            .resolve()
            .map_err(|e| EmailError::CredentialsNotFound(e.to_string()))?;

        debug!("Building SMTP sender for owner {}", owner_id);
        let mailer = SmtpMailer::new(
            &account.smtp,
            account.login(),
            &password,
            &account.email_address,
            self.timeout,
        )?;
        Ok(Box::new(mailer))
    }

    fn mailbox(&self, owner_id: i64) -> Result<Box<dyn MailboxSource>> {
        let account = self.account(owner_id)?;
        let password = account
            .password
            .resolve()
            .map_err(|e| EmailError::CredentialsNotFound(e.to_string()))?;

        debug!("Building IMAP mailbox for owner {}", owner_id);
        Ok(Box::new(ImapMailbox::new(
            account.imap.clone(),
            account.login(),
            password,
            self.timeout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImapSettings, SmtpSettings};
    use crate::secrets::SecretSource;

    fn account(owner_id: i64, password: SecretSource) -> AccountConfig {
        AccountConfig {
            owner_id,
            email_address: "office@school.example".to_string(),
            username: None,
            smtp: SmtpSettings {
                host: "smtp.school.example".to_string(),
                port: 465,
                implicit_tls: true,
            },
            imap: ImapSettings {
                host: "imap.school.example".to_string(),
                port: 993,
                use_tls: true,
            },
            password,
        }
    }

    #[test]
    fn test_unknown_owner() {
        let transports = AccountTransports::new(vec![], Duration::from_secs(5));
        assert!(matches!(
            transports.sender(1),
            Err(EmailError::ConfigError(_))
        ));
        assert!(matches!(
            transports.mailbox(1),
            Err(EmailError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_password() {
        let transports = AccountTransports::new(
            vec![account(1, SecretSource::default())],
            Duration::from_secs(5),
        );
        assert!(matches!(
            transports.sender(1),
            Err(EmailError::CredentialsNotFound(_))
        ));
    }

    #[test]
    fn test_sender_uses_account_address() {
        let password = SecretSource {
            password_insecure: Some("pw".to_string()),
            ..SecretSource::default()
        };
        let transports =
            AccountTransports::new(vec![account(7, password)], Duration::from_secs(5));

        let sender = transports.sender(7).unwrap();
        assert_eq!(sender.from_address(), "office@school.example");
        assert!(transports.mailbox(7).is_ok());
    }
}
