//! Inbox scanner — one scan cycle over the unread matching messages.
//!
//! Per cycle:
//! 1. Snapshot unread messages matching the subject prefix (arrivals after
//!    this point wait for the next cycle)
//! 2. For each `.xlsx` attachment: fetch → save → extract → notify
//! 3. Mark the message read
//!
//! Failure scopes:
//! - attachment: extraction failures and send failures are logged, the
//!   next attachment continues
//! - message: fetch/save failures abandon the message, which stays unread;
//!   a mark-read failure is logged and the next message continues
//! - cycle: a failed snapshot query ends the cycle

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::extractor::{self, ExtractionFailure, ExtractionResult};
use crate::mail::{InboundMessage, MailStore, OutboundNotification, is_qualifying};
use crate::sheet::TableReader;
use crate::storage::AttachmentStore;

/// Counters for one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Messages in the snapshot.
    pub selected: usize,
    pub attachments_saved: usize,
    pub notifications_sent: usize,
    pub marked_read: usize,
    /// Messages abandoned or left unread because of an operational error.
    pub failed_messages: usize,
}

/// Discovers matching messages and drives storage, extraction and notification.
pub struct InboxScanner {
    mail: Arc<dyn MailStore>,
    store: AttachmentStore,
    reader: Arc<dyn TableReader>,
    recipient: String,
    subject_prefix: String,
}

impl InboxScanner {
    pub fn new(
        mail: Arc<dyn MailStore>,
        store: AttachmentStore,
        reader: Arc<dyn TableReader>,
        recipient: impl Into<String>,
        subject_prefix: impl Into<String>,
    ) -> Self {
        Self {
            mail,
            store,
            reader,
            recipient: recipient.into(),
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Run one scan cycle to completion.
    ///
    /// Only a failure to take the snapshot is returned; everything after
    /// that is logged and counted in the report.
    pub async fn scan_once(&self) -> Result<CycleReport, Error> {
        let snapshot: Vec<InboundMessage> =
            self.mail.unread_matching(&self.subject_prefix).await?;

        let mut report = CycleReport {
            selected: snapshot.len(),
            ..CycleReport::default()
        };

        for mut message in snapshot {
            if let Err(e) = self.process_message(&message, &mut report).await {
                error!(
                    "Error processing email {:?}: {e}; leaving it unread",
                    message.subject
                );
                report.failed_messages += 1;
                continue;
            }

            match self.mail.mark_read(&mut message).await {
                Ok(()) => {
                    info!("Marked email as read: {}", message.subject);
                    report.marked_read += 1;
                }
                Err(e) => {
                    error!("Failed to mark email {:?} as read: {e}", message.subject);
                    report.failed_messages += 1;
                }
            }
        }

        Ok(report)
    }

    /// Handle every qualifying attachment of one message, in order.
    async fn process_message(
        &self,
        message: &InboundMessage,
        report: &mut CycleReport,
    ) -> Result<(), Error> {
        info!(
            "Processing email: {} at {}",
            message.subject, message.received_at
        );

        for info in message
            .attachments
            .iter()
            .filter(|a| is_qualifying(&a.filename))
        {
            let attachment = self.mail.attachment(message, info).await?;
            let path = self.store.save(&attachment, message.received_at).await?;
            drop(attachment);
            report.attachments_saved += 1;
            info!("Saved attachment to {}", path.display());

            match self.extract_file(path.clone()).await {
                Ok(value) => {
                    if self.notify(value, &message.subject).await {
                        report.notifications_sent += 1;
                    }
                }
                Err(failure) => {
                    warn!("No result computed for {}: {failure}", path.display());
                }
            }
        }

        Ok(())
    }

    /// Read and extract a saved file. Never fails outside the result value.
    async fn extract_file(&self, path: PathBuf) -> ExtractionResult {
        let reader = Arc::clone(&self.reader);
        tokio::task::spawn_blocking(move || extract_from(reader.as_ref(), &path))
            .await
            .unwrap_or_else(|e| Err(ExtractionFailure::ParseError(format!("reader failed: {e}"))))
    }

    /// Send the result notification; returns whether it went out.
    async fn notify(&self, value: f64, original_subject: &str) -> bool {
        let notification = OutboundNotification::for_result(
            &self.recipient,
            &self.subject_prefix,
            Local::now().date_naive(),
            original_subject,
            value,
        );

        match self.mail.send(&notification).await {
            Ok(()) => {
                info!("Sent result email: {value:.4}");
                true
            }
            Err(e) => {
                error!("Error sending email: {e}");
                false
            }
        }
    }
}

fn extract_from(reader: &dyn TableReader, path: &Path) -> ExtractionResult {
    let table = reader.read_table(path)?;
    extractor::extract(&table)
}
