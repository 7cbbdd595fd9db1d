//! Mail store abstraction: inbound messages, attachments, outbound notifications.
//!
//! The scanner only talks to a [`MailStore`]; the IMAP/SMTP implementation
//! lives in [`mailbox`].

pub mod imap;
pub mod mailbox;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::MailError;

pub use mailbox::Mailbox;

/// Extension that makes an attachment qualify for extraction.
pub const QUALIFYING_EXTENSION: &str = ".xlsx";

/// Read state of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Unread,
    Read,
}

/// Attachment metadata carried in a snapshot. Bytes are fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    /// Position among the message's attachments.
    pub index: usize,
    pub filename: String,
}

/// A message in the mail store.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Store-specific identifier (the IMAP UID for [`Mailbox`]).
    pub id: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub read_state: ReadState,
    pub attachments: Vec<AttachmentInfo>,
}

/// Attachment bytes, read once and dropped after saving.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// A result message sent to the configured recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundNotification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutboundNotification {
    /// Build the result notification for one extracted value.
    ///
    /// `label` is the report name (the configured subject prefix), `date`
    /// stamps the subject, and the value is rendered with four decimals.
    pub fn for_result(
        to: &str,
        label: &str,
        date: NaiveDate,
        original_subject: &str,
        value: f64,
    ) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("{label} Result for {}", date.format("%Y-%m-%d")),
            body: format!(
                "The computed {label} value from today's file (original subject: {original_subject}) is: {value:.4}"
            ),
        }
    }
}

/// The four operations the relay needs from a mail store.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Snapshot of unread messages whose subject starts with `subject_prefix`
    /// (case-insensitive) and that carry at least one attachment.
    async fn unread_matching(&self, subject_prefix: &str)
    -> Result<Vec<InboundMessage>, MailError>;

    /// Read the bytes of one attachment.
    async fn attachment(
        &self,
        message: &InboundMessage,
        info: &AttachmentInfo,
    ) -> Result<Attachment, MailError>;

    /// Persist the read flag for `message` and update its local state.
    async fn mark_read(&self, message: &mut InboundMessage) -> Result<(), MailError>;

    /// Send a new message.
    async fn send(&self, notification: &OutboundNotification) -> Result<(), MailError>;
}

/// Case-insensitive "starts with" on the subject line.
pub fn subject_matches(subject: &str, prefix: &str) -> bool {
    subject.to_lowercase().starts_with(&prefix.to_lowercase())
}

/// Whether a message belongs in a scan snapshot.
pub fn is_selected(message: &InboundMessage, prefix: &str) -> bool {
    message.read_state == ReadState::Unread
        && subject_matches(&message.subject, prefix)
        && !message.attachments.is_empty()
}

/// Whether an attachment is a spreadsheet the extractor should run on.
pub fn is_qualifying(filename: &str) -> bool {
    filename.to_lowercase().ends_with(QUALIFYING_EXTENSION)
}
