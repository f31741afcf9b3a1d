//! Cached sessions and stored passwords.
//!
//! Secrets themselves live in an external store (a keychain); this module only
//! decides under which id they are kept and persists the session cache file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::SESSION_FILE;
use crate::fs_utils;

/// External secret storage (system keychain or equivalent)
pub trait SecretStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<String>>;
    fn store(&self, id: &str, secret: &str) -> Result<()>;
    fn replace(&self, id: &str, secret: &str) -> Result<()>;
}

/// What the connector needs to authenticate against an org
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// "production", "sandbox" or "custom"
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
}

/// Access token plus the instance it is valid for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub instance_url: String,
}

/// Keychain id under which a project's password is kept
pub fn password_key(project_id: &str) -> String {
    format!("{}-orgsync", project_id)
}

/// Session cache and password storage for one project
pub struct CredentialStore {
    config_dir: PathBuf,
    secrets: Arc<dyn SecretStore>,
}

impl CredentialStore {
    pub fn new(config_dir: &Path, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            secrets,
        }
    }

    fn session_path(&self) -> PathBuf {
        self.config_dir.join(SESSION_FILE)
    }

    /// Load the cached session, if any
    pub fn load_session(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }

        let session: Session = fs_utils::read_json(&path)
            .context("Failed to load cached session")?;
        Ok(Some(session))
    }

    /// Persist a session, replacing any cached one
    pub fn save_session(&self, session: &Session) -> Result<()> {
        fs_utils::write_json(&self.session_path(), session)
            .context("Failed to cache session")
    }

    /// Drop the cached session so the next connection authenticates from scratch
    pub fn invalidate_session(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove cached session: {}", path.display()))?;
            debug!(path = %path.display(), "Cached session invalidated");
        }
        Ok(())
    }

    /// Store a password, replacing an existing one
    pub fn store_password(&self, project_id: &str, password: &str) -> Result<()> {
        let key = password_key(project_id);
        let existing = self.secrets.get(&key)
            .context("Failed to query secret store")?;

        let result = if existing.is_some() {
            self.secrets.replace(&key, password)
        }
        else {
            self.secrets.store(&key, password)
        };

        result.context("Failed to store password")
    }

    /// Fetch a project's password from the secret store
    pub fn password(&self, project_id: &str) -> Result<Option<String>> {
        self.secrets.get(&password_key(project_id))
            .context("Failed to read password from secret store")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemorySecretStore;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> (CredentialStore, Arc<MemorySecretStore>) {
        let secrets = Arc::new(MemorySecretStore::default());
        (CredentialStore::new(temp_dir.path(), secrets.clone()), secrets)
    }

    #[test]
    fn test_session_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let (credentials, _) = store(&temp_dir);

        assert_eq!(credentials.load_session().unwrap(), None);

        let session = Session {
            access_token: "00D!token".to_string(),
            instance_url: "https://na1.example.com".to_string(),
        };
        credentials.save_session(&session).unwrap();

        assert_eq!(credentials.load_session().unwrap(), Some(session));
        let raw = std::fs::read_to_string(temp_dir.path().join(SESSION_FILE)).unwrap();
        assert!(raw.contains("accessToken"));
        assert!(raw.contains("instanceUrl"));
    }

    #[test]
    fn test_invalidate_session() {
        let temp_dir = TempDir::new().unwrap();
        let (credentials, _) = store(&temp_dir);

        credentials.save_session(&Session {
            access_token: "t".to_string(),
            instance_url: "https://x".to_string(),
        }).unwrap();
        credentials.invalidate_session().unwrap();
        credentials.invalidate_session().unwrap();

        assert_eq!(credentials.load_session().unwrap(), None);
    }

    #[test]
    fn test_store_password_then_replace() {
        let temp_dir = TempDir::new().unwrap();
        let (credentials, secrets) = store(&temp_dir);

        credentials.store_password("abc", "first").unwrap();
        credentials.store_password("abc", "second").unwrap();

        assert_eq!(credentials.password("abc").unwrap(), Some("second".to_string()));
        assert_eq!(secrets.replace_count(), 1);
    }

    #[test]
    fn test_password_missing() {
        let temp_dir = TempDir::new().unwrap();
        let (credentials, _) = store(&temp_dir);

        assert_eq!(credentials.password("nope").unwrap(), None);
    }
}
