//! Test Utilities Module
//!
//! Scriptable transport and in-memory credential store for exercising the
//! session manager without a real network. Only compiled for tests.

#![cfg(test)]

use crate::credentials::{CredentialError, CredentialStore, Credentials};
use crate::session::{SessionManager, SessionStatus};
use crate::transport::{
    Connection, ConnectionHandle, OutboundPayload, ProtocolVersion, Transport, TransportError,
    TransportEvent,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Mock Transport
// ============================================================================

/// Transport whose connections are driven by the test
pub struct MockTransport {
    connect_calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    attempts_tx: mpsc::UnboundedSender<Arc<MockAttempt>>,
    attempts_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<MockAttempt>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            connect_calls: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            attempts_tx,
            attempts_rx: tokio::sync::Mutex::new(attempts_rx),
        })
    }

    /// Make the next `n` connect calls fail
    pub fn fail_next_connects(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Total connect calls, failed ones included
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Wait for the next successful connect
    pub async fn next_connection(&self) -> Arc<MockAttempt> {
        let mut rx = self.attempts_rx.lock().await;
        tokio::time::timeout(WAIT_TIMEOUT, rx.recv())
            .await
            .expect("Timed out waiting for a connection attempt")
            .expect("Attempt channel closed")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn latest_version(&self) -> Result<ProtocolVersion, TransportError> {
        Ok(ProtocolVersion([2, 3000, 1]))
    }

    async fn connect(
        &self,
        _session: &str,
        credentials: Credentials,
        _version: ProtocolVersion,
    ) -> Result<ConnectionHandle, TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TransportError::Connect("mock refused".to_string()));
        }

        let (events_tx, events_rx) = mpsc::channel(16);
        let connection = Arc::new(MockConnection::default());
        let attempt = Arc::new(MockAttempt {
            credentials,
            connection: connection.clone(),
            events: Mutex::new(Some(events_tx)),
        });
        let _ = self.attempts_tx.send(attempt);

        Ok(ConnectionHandle {
            connection,
            events: events_rx,
        })
    }
}

/// One successful connect: what it was given and how to drive it
pub struct MockAttempt {
    pub credentials: Credentials,
    pub connection: Arc<MockConnection>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl MockAttempt {
    /// Emit a lifecycle event as the transport would
    pub async fn emit(&self, event: TransportEvent) {
        let sender = self.events.lock().unwrap().clone();
        if let Some(sender) = sender {
            sender.send(event).await.expect("Event receiver dropped");
        }
    }

    /// End the event stream without a close event
    pub fn hang_up(&self) {
        self.events.lock().unwrap().take();
    }
}

/// Connection recording everything sent through it
#[derive(Default)]
pub struct MockConnection {
    sent: Mutex<Vec<(String, OutboundPayload)>>,
    reject_with: Mutex<Option<String>>,
    hang: AtomicBool,
    closed: AtomicBool,
}

impl MockConnection {
    pub fn sent(&self) -> Vec<(String, OutboundPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn reject_sends(&self, message: &str) {
        *self.reject_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn hang_sends(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&self, jid: &str, payload: OutboundPayload) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let rejection = self.reject_with.lock().unwrap().clone();
        if let Some(message) = rejection {
            return Err(TransportError::Rejected(message));
        }
        self.sent.lock().unwrap().push((jid.to_string(), payload));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// In-memory Credential Store
// ============================================================================

#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, session: &str) -> Option<Credentials> {
        self.entries.lock().unwrap().get(session).cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, session: &str) -> Result<Option<Credentials>, CredentialError> {
        Ok(self.get(session))
    }

    async fn save(&self, session: &str, credentials: &Credentials) -> Result<(), CredentialError> {
        self.entries
            .lock()
            .unwrap()
            .insert(session.to_string(), credentials.clone());
        Ok(())
    }

    async fn clear(&self, session: &str) -> Result<(), CredentialError> {
        self.entries.lock().unwrap().remove(session);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Poll until the manager reports `expected`
pub async fn wait_for_status(manager: &SessionManager, expected: SessionStatus) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        let status = manager.status().await.status;
        if status == expected {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("Timed out waiting for {expected}, still {status}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
