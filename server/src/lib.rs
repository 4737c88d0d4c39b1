//! WhatsApp Gateway Library
//!
//! Owns the process's single WhatsApp session and exposes it to the HTTP
//! layer. Exported for integration tests and external tooling.

pub mod config;
pub mod credentials;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use credentials::{CredentialStore, Credentials, FileCredentialStore};
pub use server::{AppState, whatsapp_routes};
pub use session::{MessageBody, SessionError, SessionManager, SessionStatus, StatusSnapshot};
pub use transport::{BridgeConfig, BridgeTransport, Transport};
