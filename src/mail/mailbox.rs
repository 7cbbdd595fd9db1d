//! IMAP + SMTP mail store.
//!
//! Each operation opens its own IMAP session on a blocking thread, so a
//! dropped connection only costs the operation that hit it. Raw messages
//! downloaded for a snapshot are kept until the message is marked read or
//! the next snapshot replaces them, so attachments are not fetched twice.
//! Outbound mail goes through lettre's SMTP transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::EmailConfig;
use crate::error::MailError;
use crate::mail::imap::ImapSession;
use crate::mail::{
    Attachment, AttachmentInfo, InboundMessage, MailStore, OutboundNotification, ReadState,
    is_selected,
};

/// Raw RFC 822 bytes from the latest snapshot, keyed by UID.
type RawCache = HashMap<u32, Arc<Vec<u8>>>;

/// Production mail store backed by an IMAP folder and an SMTP relay.
#[derive(Debug, Clone)]
pub struct Mailbox {
    config: EmailConfig,
    snapshot_raw: Arc<Mutex<RawCache>>,
}

impl Mailbox {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            snapshot_raw: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cache(&self) -> MutexGuard<'_, RawCache> {
        self.snapshot_raw
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the cached snapshot bytes.
    fn remember_snapshot(&self, raws: impl IntoIterator<Item = (u32, Vec<u8>)>) {
        let mut cache = self.cache();
        cache.clear();
        cache.extend(raws.into_iter().map(|(uid, raw)| (uid, Arc::new(raw))));
    }

    fn cached_raw(&self, uid: u32) -> Option<Arc<Vec<u8>>> {
        self.cache().get(&uid).cloned()
    }

    /// Run `op` against a fresh IMAP session on a blocking thread.
    async fn with_session<T, F>(&self, op: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailError> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::open(&config)?;
            let result = op(&mut session);
            session.logout();
            result
        })
        .await
        .map_err(|e| MailError::Io(std::io::Error::other(format!("IMAP task failed: {e}"))))?
    }

    fn send_blocking(config: &EmailConfig, n: &OutboundNotification) -> Result<(), MailError> {
        let send_err = |reason: String| MailError::SendFailed { reason };

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| send_err(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(
                config
                    .from_address
                    .parse()
                    .map_err(|e| send_err(format!("Invalid from address: {e}")))?,
            )
            .to(n
                .to
                .parse()
                .map_err(|e| send_err(format!("Invalid to address: {e}")))?)
            .subject(n.subject.as_str())
            .body(n.body.clone())
            .map_err(|e| send_err(format!("Failed to build email: {e}")))?;

        transport
            .send(&email)
            .map_err(|e| send_err(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl MailStore for Mailbox {
    async fn unread_matching(
        &self,
        subject_prefix: &str,
    ) -> Result<Vec<InboundMessage>, MailError> {
        let prefix = subject_prefix.to_string();
        let selected = self
            .with_session(move |session| {
                let uids = session.search_unseen(&prefix)?;
                debug!("IMAP search returned {} unseen candidates", uids.len());

                let mut selected = Vec::new();
                for uid in uids {
                    let raw = session.fetch_raw(uid)?;
                    match parse_message(uid, &raw) {
                        Some(message) if is_selected(&message, &prefix) => {
                            selected.push((message, raw))
                        }
                        Some(_) => {}
                        None => warn!(uid, "Skipping unparsable message"),
                    }
                }
                Ok(selected)
            })
            .await?;

        let mut messages = Vec::with_capacity(selected.len());
        let mut raws = Vec::with_capacity(selected.len());
        for (message, raw) in selected {
            if let Ok(uid) = parse_uid(&message.id) {
                raws.push((uid, raw));
            }
            messages.push(message);
        }
        self.remember_snapshot(raws);
        Ok(messages)
    }

    async fn attachment(
        &self,
        message: &InboundMessage,
        info: &AttachmentInfo,
    ) -> Result<Attachment, MailError> {
        let uid = parse_uid(&message.id)?;
        let not_found = MailError::NotFound {
            id: format!("{uid}/{}", info.index),
        };

        if let Some(raw) = self.cached_raw(uid) {
            return attachment_from_raw(&raw, info).ok_or(not_found);
        }

        debug!(uid, "Attachment not in snapshot, fetching message");
        let info = info.clone();
        let raw = self.with_session(move |session| session.fetch_raw(uid)).await?;
        attachment_from_raw(&raw, &info).ok_or(not_found)
    }

    async fn mark_read(&self, message: &mut InboundMessage) -> Result<(), MailError> {
        let uid = parse_uid(&message.id)?;
        let result = self.with_session(move |session| session.mark_seen(uid)).await;
        self.cache().remove(&uid);
        result?;
        message.read_state = ReadState::Read;
        Ok(())
    }

    async fn send(&self, notification: &OutboundNotification) -> Result<(), MailError> {
        let config = self.config.clone();
        let n = notification.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&config, &n))
            .await
            .map_err(|e| MailError::SendFailed {
                reason: format!("SMTP task failed: {e}"),
            })??;
        info!("Email sent to {}", notification.to);
        Ok(())
    }
}

fn parse_uid(id: &str) -> Result<u32, MailError> {
    id.parse()
        .map_err(|_| MailError::NotFound { id: id.to_string() })
}

/// Parse a fetched message into the scanner's view of it.
///
/// Messages fetched with `UNSEEN` are always unread.
pub fn parse_message(uid: u32, raw: &[u8]) -> Option<InboundMessage> {
    let parsed = MessageParser::default().parse(raw)?;

    let subject = parsed.subject().unwrap_or_default().to_string();
    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let attachments = parsed
        .attachments()
        .enumerate()
        .map(|(index, part)| AttachmentInfo {
            index,
            filename: part.attachment_name().unwrap_or_default().to_string(),
        })
        .collect();

    Some(InboundMessage {
        id: uid.to_string(),
        subject,
        received_at,
        read_state: ReadState::Unread,
        attachments,
    })
}

/// Pull one attachment's bytes out of a raw message.
pub fn attachment_from_raw(raw: &[u8], info: &AttachmentInfo) -> Option<Attachment> {
    let parsed = MessageParser::default().parse(raw)?;
    let part = parsed.attachments().nth(info.index)?;
    Some(Attachment {
        filename: info.filename.clone(),
        content: part.contents().to_vec(),
    })
}
