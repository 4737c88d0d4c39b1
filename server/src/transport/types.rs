//! Transport-level types and error definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::credentials::Credentials;

/// Errors raised by a transport implementation
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to fetch protocol version: {0}")]
    Version(String),

    #[error("Connection closed")]
    Closed,

    #[error("Rejected by network: {0}")]
    Rejected(String),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Messaging protocol version, e.g. `2.3000.1015901307`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion(pub [u32; 3]);

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, patch] = self.0;
        write!(f, "{major}.{minor}.{patch}")
    }
}

/// Why the network closed a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Remote side deauthorized this device; credentials are no longer valid
    LoggedOut,
    ConnectionLost,
    ConnectionClosed,
    RestartRequired,
    TimedOut,
    #[serde(other)]
    Other,
}

impl DisconnectReason {
    /// Whether the closure invalidates stored credentials
    pub fn is_terminal(self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::LoggedOut => "logged_out",
            DisconnectReason::ConnectionLost => "connection_lost",
            DisconnectReason::ConnectionClosed => "connection_closed",
            DisconnectReason::RestartRequired => "restart_required",
            DisconnectReason::TimedOut => "timed_out",
            DisconnectReason::Other => "other",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle notifications emitted by a connection, in order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    CredentialsUpdated(Credentials),
    PairingCode(String),
    Opened { identity: String },
    Closed { reason: DisconnectReason },
}

/// Content handed to the transport for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundPayload {
    Text {
        text: String,
    },
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}
