//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default seconds between scan cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_SUBJECT_PREFIX: &str = "XPOR";
pub const DEFAULT_ATTACHMENT_DIR: &str = "xpor_attachments";
pub const DEFAULT_LOG_FILE: &str = "xpor_auto_email.log";

/// Mail server connection settings.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// IMAP folder that is scanned.
    pub mailbox: String,
}

impl EmailConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let imap_host = required(&lookup, "EMAIL_IMAP_HOST")?;
        let imap_port = parsed(&lookup, "EMAIL_IMAP_PORT", 993)?;

        let smtp_host =
            lookup("EMAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp"));
        let smtp_port = parsed(&lookup, "EMAIL_SMTP_PORT", 587)?;

        let username = required(&lookup, "EMAIL_USERNAME")?;
        let password = SecretString::from(required(&lookup, "EMAIL_PASSWORD")?);
        let from_address = lookup("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone());
        let mailbox = lookup("EMAIL_MAILBOX").unwrap_or_else(|| "INBOX".to_string());

        Ok(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
            mailbox,
        })
    }
}

/// Relay settings: who gets results, which messages count, where files go.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Recipient of result notifications.
    pub recipient: String,
    /// Subject prefix a message must start with (case-insensitive).
    pub subject_prefix: String,
    /// Pause between the end of one scan cycle and the start of the next.
    pub poll_interval: Duration,
    /// Directory saved attachments are written to.
    pub attachment_dir: PathBuf,
    /// Append-only log file.
    pub log_file: PathBuf,
    pub email: EmailConfig,
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let recipient = required(&lookup, "XPOR_RECIPIENT")?;
        let subject_prefix =
            lookup("XPOR_SUBJECT_PREFIX").unwrap_or_else(|| DEFAULT_SUBJECT_PREFIX.to_string());

        let poll_interval_secs: u64 =
            parsed(&lookup, "XPOR_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "XPOR_POLL_INTERVAL_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        let attachment_dir = lookup("XPOR_ATTACHMENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ATTACHMENT_DIR));
        let log_file = lookup("XPOR_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        Ok(Self {
            recipient,
            subject_prefix,
            poll_interval: Duration::from_secs(poll_interval_secs),
            attachment_dir,
            log_file,
            email: EmailConfig::from_lookup(&lookup)?,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}
