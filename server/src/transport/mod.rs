//! Messaging transport abstraction
//!
//! This module provides:
//! - `Transport` / `Connection` traits the session manager drives
//! - `TransportEvent`, the lifecycle notifications a connection emits
//! - `BridgeTransport`, which talks to a protocol sidecar over WebSocket

mod bridge;
mod service;
mod types;

pub use bridge::{BridgeConfig, BridgeTransport};
pub use service::{Connection, ConnectionHandle, Transport};
pub use types::{DisconnectReason, OutboundPayload, ProtocolVersion, TransportError, TransportEvent};
