//! Wire messages exchanged with the protocol sidecar
//!
//! Every frame is a JSON text message tagged with `type`.

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::transport::{DisconnectReason, OutboundPayload, ProtocolVersion};

/// Gateway to sidecar commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// Open a session with the given credentials
    Connect {
        session: String,
        credentials: Credentials,
        version: ProtocolVersion,
    },
    /// Deliver a message; answered by `ack` or `send_error` with the same id
    Send {
        id: String,
        jid: String,
        payload: OutboundPayload,
    },
}

/// Sidecar to gateway events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Credentials changed and must be persisted
    CredsUpdate { credentials: Credentials },
    /// A new pairing token is available
    Qr { code: String },
    /// Handshake complete
    Open { identity: String },
    /// Connection closed by the network
    Close {
        reason: DisconnectReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },
    /// Send acknowledged
    Ack { id: String },
    /// Send failed
    SendError { id: String, message: String },
}
