//! Error types for the relay.
//!
//! Operational errors live here. Extraction failures are ordinary values
//! (see [`crate::extractor::ExtractionFailure`]) and never travel through
//! these types. [`ConfigError`] is only seen at startup, where `main`
//! reports it through `anyhow`.

use std::path::PathBuf;

/// Errors that end a scan cycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail store errors (IMAP access, SMTP send).
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Authentication failed for {user}")]
    AuthFailed { user: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Failed to send message: {reason}")]
    SendFailed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Attachment storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_errors_keep_the_inner_reason() {
        let mail = Error::from(MailError::Protocol("UID SEARCH: NO busy".into()));
        assert_eq!(mail.to_string(), "Mail error: IMAP protocol error: UID SEARCH: NO busy");

        let storage = Error::from(StorageError::CreateDir {
            path: PathBuf::from("/nope"),
            source: std::io::Error::other("denied"),
        });
        assert_eq!(
            storage.to_string(),
            "Storage error: Failed to create directory /nope: denied"
        );
    }
}
