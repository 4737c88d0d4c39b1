use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::transport::{Connection, OutboundPayload};

/// Suffix the network expects on individual (non-group) addresses
pub const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

const MIN_PHONE_DIGITS: usize = 8;
const MAX_PHONE_DIGITS: usize = 15;

/// Connection status as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    Pairing,
    Connected,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Pairing => "pairing",
            SessionStatus::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// The process's connection state to the messaging network.
///
/// Status changes only through the `apply_*` methods, which keep the
/// pairing artifact present exactly while pairing and the identity present
/// exactly while connected.
pub struct Session {
    status: SessionStatus,
    pairing_artifact: Option<String>,
    identity: Option<String>,

    // Outcome flags surfaced to operators
    pub logged_out: bool,
    pub reconnect_exhausted: bool,
    pub last_error: Option<String>,

    /// Number of connection attempts since process start
    pub connection_attempts: u64,

    pub(crate) connection: Option<Arc<dyn Connection>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            pairing_artifact: None,
            identity: None,
            logged_out: false,
            reconnect_exhausted: false,
            last_error: None,
            connection_attempts: 0,
            connection: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn pairing_artifact(&self) -> Option<&str> {
        self.pairing_artifact.as_deref()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// A pairing token was issued
    pub fn apply_pairing(&mut self, artifact: String) {
        self.status = SessionStatus::Pairing;
        self.pairing_artifact = Some(artifact);
        self.identity = None;
    }

    /// Handshake completed
    pub fn apply_opened(&mut self, identity: String) {
        self.status = SessionStatus::Connected;
        self.identity = Some(identity);
        self.pairing_artifact = None;
        self.logged_out = false;
        self.reconnect_exhausted = false;
        self.last_error = None;
    }

    /// Connection closed, for whatever reason. Returns the detached handle.
    pub fn apply_closed(&mut self) -> Option<Arc<dyn Connection>> {
        self.status = SessionStatus::Disconnected;
        self.pairing_artifact = None;
        self.identity = None;
        self.connection.take()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            identity: self.identity.clone(),
            logged_out: self.logged_out,
            reconnect_exhausted: self.reconnect_exhausted,
            last_error: self.last_error.clone(),
            connection_attempts: self.connection_attempts,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status)
            .field("has_pairing_artifact", &self.pairing_artifact.is_some())
            .field("identity", &self.identity)
            .field("logged_out", &self.logged_out)
            .field("reconnect_exhausted", &self.reconnect_exhausted)
            .field("connection_attempts", &self.connection_attempts)
            .field("has_connection", &self.connection.is_some())
            .finish()
    }
}

/// Read-only view of the session returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Remote logout happened; an operator has to pair again
    #[serde(default)]
    pub logged_out: bool,
    /// Automatic reconnection gave up
    #[serde(default)]
    pub reconnect_exhausted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Connection attempts since the process started
    #[serde(default)]
    pub connection_attempts: u64,
}

/// Message content: text, an image with optional caption, or both
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image_url: None,
        }
    }

    pub fn image(url: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            text: caption,
            image_url: Some(url.into()),
        }
    }

    /// Pick image dispatch whenever an image is present, text otherwise
    pub fn to_payload(&self) -> Option<OutboundPayload> {
        let text = self.text.as_deref().filter(|t| !t.trim().is_empty());
        let image_url = self.image_url.as_deref().filter(|u| !u.trim().is_empty());

        match (image_url, text) {
            (Some(url), caption) => Some(OutboundPayload::Image {
                url: url.to_string(),
                caption: caption.map(str::to_string),
            }),
            (None, Some(text)) => Some(OutboundPayload::Text {
                text: text.to_string(),
            }),
            (None, None) => None,
        }
    }
}

/// A message to deliver; built per call and not retained
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub recipient: String,
    pub body: MessageBody,
}

impl OutboundMessage {
    pub fn new(recipient: impl Into<String>, body: MessageBody) -> Self {
        Self {
            recipient: recipient.into(),
            body,
        }
    }
}

/// Turn a phone-number-like string into the network's address form.
///
/// Addresses that already carry a domain (`...@s.whatsapp.net`, `...@g.us`)
/// pass through unchanged.
pub fn normalize_recipient(recipient: &str) -> Option<String> {
    let trimmed = recipient.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some((user, domain)) = trimmed.split_once('@') {
        if user.is_empty() || domain.is_empty() {
            return None;
        }
        return Some(trimmed.to_string());
    }

    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if digits.len() < MIN_PHONE_DIGITS
        || digits.len() > MAX_PHONE_DIGITS
        || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    Some(format!("{digits}{USER_JID_SUFFIX}"))
}
