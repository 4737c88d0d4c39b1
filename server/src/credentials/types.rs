//! Credential types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when reading or writing credentials
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid session name: {0:?}")]
    InvalidSessionName(String),

    #[error("Corrupt credentials file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Authentication material for the messaging network.
///
/// The payload is whatever the transport hands us. It is stored and returned
/// verbatim and never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(serde_json::Value);

impl Credentials {
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    /// Credentials for a session that has never been paired
    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::empty()
    }
}
