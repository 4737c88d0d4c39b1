//! Common Test Utilities for Integration Tests
//!
//! A fake protocol sidecar speaking the bridge protocol over a real
//! WebSocket, plus router helpers.

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tower_http::cors::{Any, CorsLayer};
use whatsapp_gateway::protocol::{BridgeCommand, BridgeEvent};
use whatsapp_gateway::session::{ReconnectPolicy, SessionManagerConfig};
use whatsapp_gateway::{
    AppState, BridgeConfig, BridgeTransport, FileCredentialStore, SessionManager, SessionStatus,
    whatsapp_routes,
};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fake sidecar accepting WebSocket connections on an ephemeral port
pub struct FakeBridge {
    pub url: String,
    sessions_rx: Mutex<mpsc::UnboundedReceiver<BridgeSession>>,
}

impl FakeBridge {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let (mut sink, mut stream) = ws.split();
                let (commands_tx, commands_rx) = mpsc::unbounded_channel();
                let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Option<BridgeEvent>>();

                tokio::spawn(async move {
                    while let Some(Ok(msg)) = stream.next().await {
                        if let Message::Text(text) = msg
                            && let Ok(command) = serde_json::from_str::<BridgeCommand>(text.as_str())
                            && commands_tx.send(command).is_err()
                        {
                            break;
                        }
                    }
                });

                tokio::spawn(async move {
                    while let Some(event) = events_rx.recv().await {
                        match event {
                            Some(event) => {
                                let json = serde_json::to_string(&event).unwrap();
                                if sink.send(Message::text(json)).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                let _ = sink.close().await;
                                break;
                            }
                        }
                    }
                });

                let _ = sessions_tx.send(BridgeSession {
                    commands: commands_rx,
                    events: events_tx,
                });
            }
        });

        Self {
            url: format!("ws://{}/session", addr),
            sessions_rx: Mutex::new(sessions_rx),
        }
    }

    /// Wait for the gateway to open its next WebSocket
    pub async fn accept(&self) -> BridgeSession {
        let mut rx = self.sessions_rx.lock().await;
        tokio::time::timeout(WAIT_TIMEOUT, rx.recv())
            .await
            .expect("Timed out waiting for the gateway to connect")
            .expect("Bridge listener stopped")
    }

    /// True if the gateway opens another WebSocket within `within`
    pub async fn reconnects_within(&self, within: Duration) -> bool {
        let mut rx = self.sessions_rx.lock().await;
        matches!(tokio::time::timeout(within, rx.recv()).await, Ok(Some(_)))
    }
}

/// One gateway connection as seen by the fake sidecar
pub struct BridgeSession {
    commands: mpsc::UnboundedReceiver<BridgeCommand>,
    events: mpsc::UnboundedSender<Option<BridgeEvent>>,
}

impl BridgeSession {
    pub async fn next_command(&mut self) -> BridgeCommand {
        tokio::time::timeout(WAIT_TIMEOUT, self.commands.recv())
            .await
            .expect("Timed out waiting for a bridge command")
            .expect("Gateway closed the socket")
    }

    pub fn emit(&self, event: BridgeEvent) {
        self.events.send(Some(event)).unwrap();
    }

    /// Close the socket without a close event
    pub fn drop_socket(&self) {
        let _ = self.events.send(None);
    }
}

/// Session manager wired to a fake bridge and a credential directory
pub fn create_manager(bridge_url: &str, auth_dir: &Path) -> Arc<SessionManager> {
    let transport = Arc::new(BridgeTransport::new(BridgeConfig {
        url: bridge_url.to_string(),
        ..Default::default()
    }));
    let store = Arc::new(FileCredentialStore::new(auth_dir));
    let config = SessionManagerConfig {
        session_name: "default".to_string(),
        connect_timeout: Duration::from_secs(2),
        send_timeout: Duration::from_secs(2),
        reconnect: ReconnectPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            max_attempts: 5,
        },
    };
    Arc::new(SessionManager::with_config(transport, store, config))
}

/// Create a test application router around a session manager
pub fn create_test_app(manager: Arc<SessionManager>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/whatsapp", whatsapp_routes())
        .with_state(AppState::new(manager))
        .layer(cors)
}

/// Poll until the manager reports `expected`
pub async fn wait_for_status(manager: &SessionManager, expected: SessionStatus) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while manager.status().await.status != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Timed out waiting for {expected}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Initialize test logging for detailed output
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whatsapp_gateway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
