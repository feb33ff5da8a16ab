//! Mailbox password resolution.
//!
//! A password may come from one of three places, checked in order:
//!
//! 1. **Inline value** - `passwordInsecure` in the config file (local testing only)
//! 2. **File** - `passwordFile`, e.g. a Docker secret under `/run/secrets`
//! 3. **Environment variable** - `passwordEnvVar`

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// The configured places a password may be read from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_insecure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,
}

impl SecretSource {
    pub fn from_env_var(name: &str) -> Self {
        Self {
            password_env_var: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Resolves the password, warning when the inline value is used.
    pub fn resolve(&self) -> Result<SecretString> {
        if self.password_insecure.as_deref().is_some_and(|v| !v.is_empty()) {
            log::warn!(
                "Using direct password value (passwordInsecure) is not recommended. \
                 Consider using passwordEnvVar or passwordFile instead."
            );
        }
        resolve_secret(
            self.password_insecure.as_deref(),
            self.password_file.as_deref(),
            self.password_env_var.as_deref(),
        )
    }

    pub fn is_configured(&self) -> bool {
        [
            &self.password_insecure,
            &self.password_file,
            &self.password_env_var,
        ]
        .iter()
        .any(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// Resolves a secret from the first non-empty source: direct value, then
/// file contents, then environment variable.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct {
        if !value.is_empty() {
            return Ok(SecretString::from(value.to_string()));
        }
    }

    if let Some(path) = file_path {
        if !path.is_empty() {
            let expanded = expand_home(path);
            return match fs::read_to_string(&expanded) {
                Ok(content) => Ok(SecretString::from(content.trim().to_string())),
                Err(e) => Err(SecretError::FileReadError {
                    path: expanded,
                    source: e,
                }),
            };
        }
    }

    if let Some(var_name) = env_var {
        if !var_name.is_empty() {
            return match std::env::var(var_name) {
                // Env vars set from files often carry a trailing newline.
                Ok(value) => Ok(SecretString::from(value.trim())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: var_name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: var_name.to_string(),
                }),
            };
        }
    }

    Err(SecretError::NoSourceProvided)
}

pub fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
