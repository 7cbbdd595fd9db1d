//! Minimal blocking IMAP client over TLS (rustls + webpki roots).
//!
//! Only what the mailbox needs: login, select, UID SEARCH, UID FETCH of a
//! full message with `BODY.PEEK[]`, and UID STORE of the `\Seen` flag.
//! Run from `spawn_blocking`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::EmailConfig;
use crate::error::MailError;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Untagged lines and literals returned for one tagged command.
#[derive(Debug, Default)]
pub struct Response {
    pub lines: Vec<String>,
    pub literals: Vec<Vec<u8>>,
}

/// An authenticated IMAP session with one mailbox selected.
pub struct ImapSession {
    tls: TlsStream,
    next_tag: u32,
}

impl ImapSession {
    /// Connect, log in and select the configured mailbox.
    pub fn open(config: &EmailConfig) -> Result<Self, MailError> {
        let connect_err = |reason: String| MailError::Connect {
            host: config.imap_host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
            .map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.imap_host.clone())
            .map_err(|e| connect_err(e.to_string()))?;
        let conn =
            ClientConnection::new(tls_config, server_name).map_err(|e| connect_err(e.to_string()))?;

        let mut session = Self {
            tls: StreamOwned::new(conn, tcp),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with(b"* OK") && !greeting.starts_with(b"* PREAUTH") {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {}",
                String::from_utf8_lossy(&greeting).trim_end()
            )));
        }

        session
            .command(&format!(
                "LOGIN {} {}",
                quote(&config.username),
                quote(config.password.expose_secret())
            ))
            .map_err(|e| match e {
                MailError::Protocol(_) => MailError::AuthFailed {
                    user: config.username.clone(),
                },
                other => other,
            })?;

        session.command(&format!("SELECT {}", quote(&config.mailbox)))?;
        Ok(session)
    }

    /// UIDs of unseen messages, narrowed server-side by subject when possible.
    pub fn search_unseen(&mut self, subject_hint: &str) -> Result<Vec<u32>, MailError> {
        let criteria = if !subject_hint.is_empty() && subject_hint.is_ascii() {
            format!("UNSEEN SUBJECT {}", quote(subject_hint))
        } else {
            "UNSEEN".to_string()
        };
        let response = self.command(&format!("UID SEARCH {criteria}"))?;
        Ok(parse_search(&response.lines))
    }

    /// Full RFC 822 bytes of one message. Does not set `\Seen`.
    pub fn fetch_raw(&mut self, uid: u32) -> Result<Vec<u8>, MailError> {
        let response = self.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        response
            .literals
            .into_iter()
            .next()
            .ok_or(MailError::NotFound { id: uid.to_string() })
    }

    pub fn mark_seen(&mut self, uid: u32) -> Result<(), MailError> {
        self.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
        Ok(())
    }

    /// Best-effort LOGOUT; the connection is dropped either way.
    pub fn logout(mut self) {
        let _ = self.command("LOGOUT");
    }

    /// Send one tagged command and collect its response.
    ///
    /// Fails with [`MailError::Protocol`] unless the tagged status is `OK`.
    pub fn command(&mut self, cmd: &str) -> Result<Response, MailError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.tls.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.tls.flush()?;

        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            let text = String::from_utf8_lossy(&line).into_owned();

            if let Some(status) = text.strip_prefix(&format!("{tag} ")) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                let verb = cmd.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
                return Err(MailError::Protocol(format!("{verb}: {}", status.trim_end())));
            }

            if let Some(len) = literal_length(&text) {
                let mut literal = vec![0u8; len];
                self.tls.read_exact(&mut literal)?;
                debug!(bytes = len, "IMAP literal received");
                response.literals.push(literal);
            }
            response.lines.push(text);
        }
    }

    fn read_line(&mut self) -> Result<Vec<u8>, MailError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.tls.read(&mut byte)? {
                0 => return Err(MailError::Protocol("IMAP connection closed".into())),
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(buf);
                    }
                }
            }
        }
    }
}

/// Quote a string as an IMAP quoted-string.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Size of a `{N}` literal announced at the end of a response line.
pub fn literal_length(line: &str) -> Option<usize> {
    let body = line.trim_end_matches("\r\n").strip_suffix('}')?;
    let open = body.rfind('{')?;
    body[open + 1..].trim_end_matches('+').parse().ok()
}

/// Collect UIDs from `* SEARCH` lines.
pub fn parse_search(lines: &[String]) -> Vec<u32> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().filter_map(|n| n.parse().ok()))
        .collect()
}
