//! Filesystem-backed credential store
//!
//! Layout: `<auth_dir>/<session>/creds.json`. Writes go to a temporary file
//! which is synced and then renamed over the previous value.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::service::CredentialStore;
use super::types::{CredentialError, Credentials};

const CREDENTIALS_FILE: &str = "creds.json";

/// Credential store keeping one JSON document per session directory
pub struct FileCredentialStore {
    root: PathBuf,
}

impl FileCredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session: &str) -> Result<PathBuf, CredentialError> {
        if !is_valid_session_name(session) {
            return Err(CredentialError::InvalidSessionName(session.to_string()));
        }
        Ok(self.root.join(session))
    }

    fn credentials_path(&self, session: &str) -> Result<PathBuf, CredentialError> {
        Ok(self.session_dir(session)?.join(CREDENTIALS_FILE))
    }
}

/// Session names become directory names, so keep them to a safe charset
fn is_valid_session_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, session: &str) -> Result<Option<Credentials>, CredentialError> {
        let path = self.credentials_path(session)?;

        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored credentials at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let credentials: Credentials = serde_json::from_slice(&content)?;
        debug!("Loaded credentials for session {}", session);
        Ok(Some(credentials))
    }

    async fn save(&self, session: &str, credentials: &Credentials) -> Result<(), CredentialError> {
        let dir = self.session_dir(session)?;
        fs::create_dir_all(&dir).await?;

        let path = dir.join(CREDENTIALS_FILE);
        let tmp_path = dir.join(format!("{CREDENTIALS_FILE}.tmp"));
        let content = serde_json::to_vec(credentials)?;

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;
        debug!("Persisted credentials for session {}", session);
        Ok(())
    }

    async fn clear(&self, session: &str) -> Result<(), CredentialError> {
        let dir = self.session_dir(session)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Cleared credentials for session {}", session);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
