use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "workerCount must be greater than 0".to_string(),
        });
    }

    if config.queue_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "queueCapacity must be greater than 0".to_string(),
        });
    }

    if config.ingest_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "ingestIntervalSecs must be greater than 0".to_string(),
        });
    }

    if config.network_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "networkTimeoutSecs must be greater than 0".to_string(),
        });
    }

    if config.upload_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "uploadDirectory must not be empty".to_string(),
        });
    }

    let mut owners = HashSet::new();
    for account in &config.accounts {
        if !owners.insert(account.owner_id) {
            return Err(ConfigError::Validation {
                message: format!("Duplicate account for owner {}", account.owner_id),
            });
        }

        if !account.email_address.contains('@') {
            return Err(ConfigError::Validation {
                message: format!(
                    "Account for owner {} has invalid email address '{}'",
                    account.owner_id, account.email_address
                ),
            });
        }

        for (label, host, port) in [
            ("smtp", &account.smtp.host, account.smtp.port),
            ("imap", &account.imap.host, account.imap.port),
        ] {
            if host.trim().is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("Account for owner {} has empty {} host", account.owner_id, label),
                });
            }
            if port == 0 {
                return Err(ConfigError::Validation {
                    message: format!("Account for owner {} has {} port 0", account.owner_id, label),
                });
            }
        }

        if !account.password.is_configured() {
            return Err(ConfigError::Validation {
                message: format!(
                    "Account for owner {} needs passwordEnvVar, passwordFile or passwordInsecure",
                    account.owner_id
                ),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;

    const ACCOUNT: &str = r#"{
        "ownerId": 1,
        "emailAddress": "office@school.example",
        "smtp": { "host": "smtp.school.example" },
        "imap": { "host": "imap.school.example" },
        "passwordEnvVar": "OFFICE_MAIL_PASSWORD"
    }"#;

    #[test]
    fn test_defaults_applied() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.upload_directory, "./uploads");
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.ingest_interval_secs, 600);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.accounts.is_empty());
        assert!(config.replies_directory().ends_with("uploads/replies"));
        assert!(config.aggregated_directory().ends_with("uploads/aggregated"));
    }

    #[test]
    fn test_account_parsing() {
        let json = format!(r#"{{ "accounts": [{}] }}"#, ACCOUNT);
        let config = load_config_from_str(&json).unwrap();
        let account = config.account(1).unwrap();
        assert_eq!(account.smtp.port, 465);
        assert!(account.smtp.implicit_tls);
        assert_eq!(account.imap.port, 993);
        assert_eq!(account.login(), "office@school.example");
        assert_eq!(
            account.password.password_env_var.as_deref(),
            Some("OFFICE_MAIL_PASSWORD")
        );
        assert!(config.account(2).is_none());
    }

    #[test]
    fn test_duplicate_owner_rejected() {
        let json = format!(r#"{{ "accounts": [{}, {}] }}"#, ACCOUNT, ACCOUNT);
        let err = load_config_from_str(&json).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = load_config_from_str(r#"{ "workerCount": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_account_without_password_rejected() {
        let json = r#"{ "accounts": [{
            "ownerId": 3,
            "emailAddress": "x@y.example",
            "smtp": { "host": "smtp.y.example" },
            "imap": { "host": "imap.y.example" }
        }] }"#;
        assert!(load_config_from_str(json).is_err());
    }

    #[test]
    fn test_invalid_json() {
        let err = load_config_from_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/nonexistent/replyroll.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
