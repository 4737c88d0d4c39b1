pub mod manager;
pub mod pairing;
pub mod reconnect;
pub mod state;

pub use manager::{SessionError, SessionManager, SessionManagerConfig};
pub use reconnect::ReconnectPolicy;
pub use state::{MessageBody, OutboundMessage, SessionStatus, StatusSnapshot};
