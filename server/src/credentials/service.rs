//! CredentialStore trait definition

use async_trait::async_trait;

use super::types::{CredentialError, Credentials};

/// Trait for credential stores, keyed by a fixed session name
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored credentials, if any
    async fn load(&self, session: &str) -> Result<Option<Credentials>, CredentialError>;

    /// Persist credentials, overwriting any prior value
    async fn save(&self, session: &str, credentials: &Credentials) -> Result<(), CredentialError>;

    /// Remove stored credentials (after a remote logout they are useless)
    async fn clear(&self, session: &str) -> Result<(), CredentialError>;

    /// Load stored credentials or start from an empty set
    async fn load_or_empty(&self, session: &str) -> Result<Credentials, CredentialError> {
        Ok(self.load(session).await?.unwrap_or_default())
    }
}
