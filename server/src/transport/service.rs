//! Transport trait definitions

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::types::{OutboundPayload, ProtocolVersion, TransportError, TransportEvent};
use crate::credentials::Credentials;

/// A freshly opened connection and the stream of its lifecycle events.
///
/// The receiver has exactly one consumer: whoever owns the handle.
pub struct ConnectionHandle {
    pub connection: Arc<dyn Connection>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Trait for messaging transports
#[async_trait]
pub trait Transport: Send + Sync {
    /// Look up the newest protocol version the network accepts
    async fn latest_version(&self) -> Result<ProtocolVersion, TransportError>;

    /// Open a connection using stored credentials
    async fn connect(
        &self,
        session: &str,
        credentials: Credentials,
        version: ProtocolVersion,
    ) -> Result<ConnectionHandle, TransportError>;
}

/// A live connection to the messaging network
#[async_trait]
pub trait Connection: Send + Sync {
    /// Deliver a payload to a normalized address, resolving on acknowledgment
    async fn send(&self, jid: &str, payload: OutboundPayload) -> Result<(), TransportError>;

    /// Tear down the underlying socket. Pending sends fail.
    async fn close(&self);
}
