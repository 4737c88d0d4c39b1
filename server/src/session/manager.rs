use crate::credentials::CredentialStore;
use crate::session::pairing::render_qr_data_url;
use crate::session::reconnect::{Backoff, ReconnectPolicy};
use crate::session::state::{
    MessageBody, OutboundMessage, Session, SessionStatus, StatusSnapshot, normalize_recipient,
};
use crate::transport::{ConnectionHandle, DisconnectReason, Transport, TransportEvent};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Session manager errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connection setup failed: {0}")]
    ConnectionSetupFailed(String),

    #[error("WhatsApp not connected")]
    NotConnected,

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Session manager configuration
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Fixed key under which credentials are stored
    pub session_name: String,
    /// Bound on version lookup plus connect
    pub connect_timeout: Duration,
    /// Bound on a single send
    pub send_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            session_name: "default".to_string(),
            connect_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Owns the single connection to the messaging network.
///
/// `start()` spawns a supervisor task that opens connections, consumes their
/// lifecycle events one at a time and reconnects after recoverable closures.
/// Callers only ever see the session through `status()`,
/// `pairing_artifact()` and `send()`.
pub struct SessionManager {
    session: Arc<RwLock<Session>>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    config: SessionManagerConfig,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_config(transport, store, SessionManagerConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            session: Arc::new(RwLock::new(Session::new())),
            transport,
            store,
            config,
            supervisor: Mutex::new(None),
        }
    }

    /// Start the supervisor if it is not already running.
    ///
    /// Returns immediately; connection establishment happens in the
    /// background. Returns `false` when a supervisor was already active.
    pub async fn start(&self) -> bool {
        let mut supervisor = self.supervisor.lock().await;
        if let Some(handle) = supervisor.as_ref()
            && !handle.is_finished()
        {
            debug!("Session supervisor already running");
            return false;
        }

        {
            let mut session = self.session.write().await;
            session.logged_out = false;
            session.reconnect_exhausted = false;
            session.last_error = None;
        }

        let task = Supervisor {
            session: self.session.clone(),
            transport: self.transport.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
        };
        *supervisor = Some(tokio::spawn(task.run()));
        info!("Started session supervisor for {}", self.config.session_name);
        true
    }

    /// Whether a supervisor task is alive
    pub async fn is_running(&self) -> bool {
        self.supervisor
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the supervisor and close the active connection
    pub async fn shutdown(&self) {
        if let Some(handle) = self.supervisor.lock().await.take() {
            handle.abort();
        }

        let connection = self.session.write().await.apply_closed();
        if let Some(connection) = connection {
            connection.close().await;
        }
        info!("Session {} shut down", self.config.session_name);
    }

    /// Current status, plus identity when connected
    pub async fn status(&self) -> StatusSnapshot {
        self.session.read().await.snapshot()
    }

    /// Current pairing artifact, if the session is pairing
    pub async fn pairing_artifact(&self) -> Option<String> {
        let session = self.session.read().await;
        match session.status() {
            SessionStatus::Pairing => session.pairing_artifact().map(str::to_string),
            _ => None,
        }
    }

    /// Deliver a message over the active connection
    pub async fn send(&self, recipient: &str, body: MessageBody) -> Result<(), SessionError> {
        let message = OutboundMessage::new(recipient, body);

        let connection = {
            let session = self.session.read().await;
            if session.status() != SessionStatus::Connected {
                counter!("whatsapp_messages_failed_total", "reason" => "not_connected")
                    .increment(1);
                return Err(SessionError::NotConnected);
            }
            session.connection.clone().ok_or(SessionError::NotConnected)?
        };

        let jid = normalize_recipient(&message.recipient).ok_or_else(|| {
            SessionError::InvalidMessage(format!("invalid recipient {:?}", message.recipient))
        })?;
        let payload = message.body.to_payload().ok_or_else(|| {
            SessionError::InvalidMessage("message needs text or an image".to_string())
        })?;

        let start = Instant::now();
        let result = tokio::time::timeout(self.config.send_timeout, connection.send(&jid, payload))
            .await;
        histogram!("whatsapp_send_duration_seconds").record(start.elapsed());

        match result {
            Ok(Ok(())) => {
                counter!("whatsapp_messages_sent_total").increment(1);
                debug!("Delivered message to {}", jid);
                Ok(())
            }
            Ok(Err(e)) => {
                counter!("whatsapp_messages_failed_total", "reason" => "delivery").increment(1);
                warn!("Failed to deliver message to {}: {}", jid, e);
                Err(SessionError::DeliveryFailed(e.to_string()))
            }
            Err(_) => {
                counter!("whatsapp_messages_failed_total", "reason" => "timeout").increment(1);
                warn!("Timed out delivering message to {}", jid);
                Err(SessionError::DeliveryFailed(format!(
                    "no acknowledgment within {:?}",
                    self.config.send_timeout
                )))
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.get_mut().take() {
            handle.abort();
        }
    }
}

/// How a connection ended
enum Closure {
    Recoverable(DisconnectReason),
    LoggedOut,
}

/// Background task owning the connection lifecycle
struct Supervisor {
    session: Arc<RwLock<Session>>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    config: SessionManagerConfig,
}

impl Supervisor {
    async fn run(self) {
        let mut backoff = Backoff::new(self.config.reconnect.clone());

        loop {
            match self.establish().await {
                Ok(handle) => match self.drive(handle, &mut backoff).await {
                    Closure::LoggedOut => {
                        self.handle_logout().await;
                        return;
                    }
                    Closure::Recoverable(reason) => {
                        info!("Connection closed ({}), reconnecting", reason);
                    }
                },
                Err(e) => {
                    counter!("whatsapp_connection_setup_failures_total").increment(1);
                    error!("{}", e);
                    self.session.write().await.last_error = Some(e.to_string());
                }
            }

            match backoff.next_delay() {
                Some(delay) => {
                    counter!("whatsapp_reconnects_total").increment(1);
                    debug!(
                        "Reconnect attempt {} in {:?}",
                        backoff.attempts(),
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(
                        "Giving up after {} consecutive failed attempts; call start() to retry",
                        backoff.attempts()
                    );
                    self.session.write().await.reconnect_exhausted = true;
                    return;
                }
            }
        }
    }

    /// Load credentials, look up the protocol version and open a connection
    async fn establish(&self) -> Result<ConnectionHandle, SessionError> {
        self.session.write().await.connection_attempts += 1;

        let attempt = async {
            let credentials = self
                .store
                .load_or_empty(&self.config.session_name)
                .await
                .map_err(|e| SessionError::ConnectionSetupFailed(e.to_string()))?;
            let version = self
                .transport
                .latest_version()
                .await
                .map_err(|e| SessionError::ConnectionSetupFailed(e.to_string()))?;
            info!(
                "Connecting session {} with protocol version {}",
                self.config.session_name, version
            );
            self.transport
                .connect(&self.config.session_name, credentials, version)
                .await
                .map_err(|e| SessionError::ConnectionSetupFailed(e.to_string()))
        };

        let handle = tokio::time::timeout(self.config.connect_timeout, attempt)
            .await
            .map_err(|_| {
                SessionError::ConnectionSetupFailed(format!(
                    "timed out after {:?}",
                    self.config.connect_timeout
                ))
            })??;

        let stale = self
            .session
            .write()
            .await
            .connection
            .replace(handle.connection.clone());
        if let Some(stale) = stale {
            stale.close().await;
        }

        Ok(handle)
    }

    /// Apply lifecycle events in arrival order until the connection ends
    async fn drive(&self, mut handle: ConnectionHandle, backoff: &mut Backoff) -> Closure {
        while let Some(event) = handle.events.recv().await {
            match event {
                TransportEvent::CredentialsUpdated(credentials) => {
                    if let Err(e) = self
                        .store
                        .save(&self.config.session_name, &credentials)
                        .await
                    {
                        error!("Failed to persist credentials: {}", e);
                    }
                }
                TransportEvent::PairingCode(token) => {
                    if token.trim().is_empty() {
                        warn!("Ignoring empty pairing code");
                        continue;
                    }
                    let artifact = render_qr_data_url(&token).unwrap_or_else(|e| {
                        warn!("Failed to render pairing QR, using raw token: {}", e);
                        token
                    });
                    self.session.write().await.apply_pairing(artifact);
                    info!("Pairing code issued; scan the QR code to link the account");
                }
                TransportEvent::Opened { identity } => {
                    info!("Connected as {}", identity);
                    self.session.write().await.apply_opened(identity);
                    backoff.reset();
                }
                TransportEvent::Closed { reason } => {
                    self.teardown().await;
                    if reason.is_terminal() {
                        return Closure::LoggedOut;
                    }
                    return Closure::Recoverable(reason);
                }
            }
        }

        warn!("Transport event stream ended without a close event");
        self.teardown().await;
        Closure::Recoverable(DisconnectReason::ConnectionLost)
    }

    /// Mark the session disconnected, then release the socket
    async fn teardown(&self) {
        let connection = self.session.write().await.apply_closed();
        if let Some(connection) = connection {
            connection.close().await;
        }
    }

    async fn handle_logout(&self) {
        warn!(
            "Session {} was logged out remotely; pair again to reconnect",
            self.config.session_name
        );
        counter!("whatsapp_logouts_total").increment(1);

        if let Err(e) = self.store.clear(&self.config.session_name).await {
            error!("Failed to clear invalidated credentials: {}", e);
        }
        self.session.write().await.logged_out = true;
    }
}
