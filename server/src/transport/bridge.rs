//! WebSocket bridge transport
//!
//! The messaging protocol itself lives in a sidecar process. This transport
//! opens one WebSocket to the sidecar per connection attempt, sends a
//! `connect` command carrying the stored credentials, and then translates
//! sidecar events (see `protocol::messages`) into `TransportEvent`s.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::service::{Connection, ConnectionHandle, Transport};
use super::types::{DisconnectReason, OutboundPayload, ProtocolVersion, TransportError, TransportEvent};
use crate::credentials::Credentials;
use crate::protocol::{BridgeCommand, BridgeEvent};

/// Version used when no lookup URL is configured
pub const DEFAULT_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion([2, 3000, 1015901307]);

const EVENT_CHANNEL_CAPACITY: usize = 64;
const OUTGOING_CHANNEL_CAPACITY: usize = 64;

type PendingSends = Arc<Mutex<HashMap<String, oneshot::Sender<Result<(), String>>>>>;

/// Configuration for the sidecar bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// WebSocket URL of the sidecar, e.g. `ws://127.0.0.1:3001/session`
    pub url: String,
    /// JSON document of the form `{"version":[2,3000,n]}`
    pub version_url: Option<String>,
    /// Version used when `version_url` is unset
    pub default_version: ProtocolVersion,
    /// Timeout for the version lookup request
    pub http_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3001/session".to_string(),
            version_url: None,
            default_version: DEFAULT_PROTOCOL_VERSION,
            http_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Deserialize)]
struct VersionDocument {
    version: [u32; 3],
}

/// Transport talking to a protocol sidecar over WebSocket
pub struct BridgeTransport {
    config: BridgeConfig,
    http: reqwest::Client,
}

impl BridgeTransport {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn latest_version(&self) -> Result<ProtocolVersion, TransportError> {
        let Some(url) = self.config.version_url.as_deref() else {
            return Ok(self.config.default_version);
        };

        let document: VersionDocument = self
            .http
            .get(url)
            .timeout(self.config.http_timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| TransportError::Version(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Version(e.to_string()))?;

        let version = ProtocolVersion(document.version);
        debug!("Latest protocol version: {}", version);
        Ok(version)
    }

    async fn connect(
        &self,
        session: &str,
        credentials: Credentials,
        version: ProtocolVersion,
    ) -> Result<ConnectionHandle, TransportError> {
        let (ws_stream, _response) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Connected to bridge at {}", self.config.url);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let hello = serde_json::to_string(&BridgeCommand::Connect {
            session: session.to_string(),
            credentials,
            version,
        })?;
        ws_sender
            .send(Message::text(hello))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(OUTGOING_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(EVENT_CHANNEL_CAPACITY);
        let pending: PendingSends = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        // Forward outgoing frames to the socket
        let send_task = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = ws_sender.send(msg).await {
                    debug!("Bridge write failed: {}", e);
                    break;
                }
                if is_close {
                    break;
                }
            }
        });

        // Route incoming frames to pending sends or the event channel
        let recv_pending = pending.clone();
        let recv_closed = closed.clone();
        let recv_task = tokio::spawn(async move {
            let mut close_seen = false;

            while let Some(frame) = ws_receiver.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Bridge read failed: {}", e);
                        break;
                    }
                };

                let event = match serde_json::from_str::<BridgeEvent>(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        error!("Failed to parse bridge event: {}", e);
                        continue;
                    }
                };

                let transport_event = match event {
                    BridgeEvent::Ack { id } => {
                        resolve_pending(&recv_pending, &id, Ok(()));
                        continue;
                    }
                    BridgeEvent::SendError { id, message } => {
                        resolve_pending(&recv_pending, &id, Err(message));
                        continue;
                    }
                    BridgeEvent::CredsUpdate { credentials } => {
                        TransportEvent::CredentialsUpdated(credentials)
                    }
                    BridgeEvent::Qr { code } => TransportEvent::PairingCode(code),
                    BridgeEvent::Open { identity } => TransportEvent::Opened { identity },
                    BridgeEvent::Close {
                        reason,
                        status_code,
                    } => {
                        debug!(
                            "Bridge reported close: reason={} status_code={:?}",
                            reason, status_code
                        );
                        close_seen = true;
                        TransportEvent::Closed { reason }
                    }
                };

                if event_tx.send(transport_event).await.is_err() {
                    break;
                }
                if close_seen {
                    break;
                }
            }

            recv_closed.store(true, Ordering::SeqCst);
            // Dropping the senders fails every in-flight send
            if let Ok(mut pending) = recv_pending.lock() {
                pending.clear();
            }

            if !close_seen {
                let _ = event_tx
                    .send(TransportEvent::Closed {
                        reason: DisconnectReason::ConnectionLost,
                    })
                    .await;
            }
            debug!("Bridge receive loop ended");
        });

        let connection = BridgeConnection {
            outgoing: outgoing_tx,
            pending,
            closed,
            tasks: Mutex::new(vec![send_task, recv_task]),
        };

        Ok(ConnectionHandle {
            connection: Arc::new(connection),
            events: event_rx,
        })
    }
}

fn resolve_pending(pending: &PendingSends, id: &str, result: Result<(), String>) {
    let waiter = pending.lock().ok().and_then(|mut p| p.remove(id));
    match waiter {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => debug!("Bridge answered unknown send id {}", id),
    }
}

/// One WebSocket session with the sidecar
struct BridgeConnection {
    outgoing: mpsc::Sender<Message>,
    pending: PendingSends,
    closed: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Removes a send's waiter from the pending table when the send finishes or is dropped
struct PendingGuard<'a> {
    pending: &'a PendingSends,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(self.id);
        }
    }
}

#[async_trait]
impl Connection for BridgeConnection {
    async fn send(&self, jid: &str, payload: OutboundPayload) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let id = Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&BridgeCommand::Send {
            id: id.clone(),
            jid: jid.to_string(),
            payload,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| TransportError::Closed)?
            .insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        // The receive loop may have shut down between the check above and the insert
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        if self.outgoing.send(Message::text(frame)).await.is_err() {
            return Err(TransportError::Closed);
        }

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(TransportError::Rejected(message)),
            Err(_) => Err(TransportError::Closed),
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst)
            && self.outgoing.try_send(Message::Close(None)).is_err()
        {
            debug!("Bridge writer busy, dropping close frame");
            self.abort_tasks();
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        // The send task exits after writing the close frame
        if let Ok(mut tasks) = self.tasks.lock()
            && let Some(recv_task) = tasks.pop()
        {
            recv_task.abort();
        }
        debug!("Bridge connection closed");
    }
}

impl BridgeConnection {
    fn abort_tasks(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_version_falls_back_to_default() {
        let transport = BridgeTransport::new(BridgeConfig::default());
        let version = transport.latest_version().await.unwrap();
        assert_eq!(version, DEFAULT_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_connect_to_missing_bridge_fails() {
        let transport = BridgeTransport::new(BridgeConfig {
            url: "ws://127.0.0.1:9/session".to_string(),
            ..Default::default()
        });
        let result = transport
            .connect("default", Credentials::empty(), DEFAULT_PROTOCOL_VERSION)
            .await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    fn idle_connection(capacity: usize) -> (BridgeConnection, mpsc::Receiver<Message>) {
        let (outgoing, outgoing_rx) = mpsc::channel(capacity);
        let connection = BridgeConnection {
            outgoing,
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        };
        (connection, outgoing_rx)
    }

    fn text_payload() -> OutboundPayload {
        OutboundPayload::Text {
            text: "hola".to_string(),
        }
    }

    #[tokio::test]
    async fn test_abandoned_sends_leave_no_waiters() {
        let (connection, mut outgoing_rx) = idle_connection(OUTGOING_CHANNEL_CAPACITY);

        for _ in 0..5 {
            let result = tokio::time::timeout(
                Duration::from_millis(10),
                connection.send("5215511112222@s.whatsapp.net", text_payload()),
            )
            .await;
            assert!(result.is_err());
        }

        assert!(connection.pending.lock().unwrap().is_empty());
        for _ in 0..5 {
            assert!(matches!(outgoing_rx.try_recv(), Ok(Message::Text(_))));
        }
    }

    #[tokio::test]
    async fn test_answered_send_removes_waiter() {
        let (connection, mut outgoing_rx) = idle_connection(OUTGOING_CHANNEL_CAPACITY);
        let pending = connection.pending.clone();

        let responder = tokio::spawn(async move {
            let Some(Message::Text(text)) = outgoing_rx.recv().await else {
                panic!("expected a send frame");
            };
            let BridgeCommand::Send { id, .. } =
                serde_json::from_str::<BridgeCommand>(text.as_str()).unwrap()
            else {
                panic!("expected a send command");
            };
            resolve_pending(&pending, &id, Err("not on whatsapp".to_string()));
        });

        let result = connection
            .send("5215511112222@s.whatsapp.net", text_payload())
            .await;
        responder.await.unwrap();

        assert!(matches!(result, Err(TransportError::Rejected(_))));
        assert!(connection.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_does_not_wait_on_full_writer() {
        let (connection, _outgoing_rx) = idle_connection(1);
        connection
            .outgoing
            .try_send(Message::text("backlog"))
            .unwrap();
        let writer = tokio::spawn(std::future::pending::<()>());
        connection.tasks.lock().unwrap().push(writer);

        tokio::time::timeout(Duration::from_secs(1), connection.close())
            .await
            .expect("close blocked on a full outgoing channel");

        assert!(connection.closed.load(Ordering::SeqCst));
        assert!(connection.tasks.lock().unwrap().is_empty());
        let result = connection
            .send("5215511112222@s.whatsapp.net", text_payload())
            .await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
