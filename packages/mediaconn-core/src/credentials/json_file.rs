use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CredentialStore, StoreError, StoreResult};
use crate::model::ServerCredentials;

/// File name used inside the data directory.
pub const CREDENTIALS_FILE_NAME: &str = "servers.json";

/// Credential store backed by a JSON file.
///
/// A missing file reads as empty credentials. Writes go to a sibling temp
/// file that is then renamed over the target, so a crash mid-write never
/// leaves a truncated document behind.
#[derive(Debug)]
pub struct JsonFileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileCredentialStore {
    /// Creates a store for an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Creates a store for [`CREDENTIALS_FILE_NAME`] inside `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(CREDENTIALS_FILE_NAME))
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialStore for JsonFileCredentialStore {
    async fn get_server_credentials(&self) -> StoreResult<ServerCredentials> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!(
                    "[Credentials] No credentials file at {}, starting empty",
                    self.path.display()
                );
                return Ok(ServerCredentials::default());
            }
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "{}: {e}",
                    self.path.display()
                )))
            }
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", self.path.display())))
    }

    async fn save_server_credentials(&self, credentials: &ServerCredentials) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(credentials)
            .map_err(|e| StoreError::Write(e.to_string()))?;

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Write(format!("{}: {e}", parent.display())))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &json)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {e}", temp.display())))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {e}", self.path.display())))?;

        log::debug!(
            "[Credentials] Saved {} server(s) to {}",
            credentials.servers.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::{ConnectionMode, ServerRecord};

    fn credentials() -> ServerCredentials {
        let mut creds = ServerCredentials::default();
        creds.add_or_update_server(ServerRecord {
            id: "abc123".into(),
            name: "Den".into(),
            local_address: Some("http://192.168.1.5:8096".into()),
            last_connection_mode: Some(ConnectionMode::Local),
            ..Default::default()
        });
        creds
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCredentialStore::in_dir(dir.path());
        let creds = store.get_server_credentials().await.unwrap();
        assert!(creds.servers.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_returns_same_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCredentialStore::in_dir(dir.path().join("nested"));

        store.save_server_credentials(&credentials()).await.unwrap();

        assert_eq!(store.get_server_credentials().await.unwrap(), credentials());
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCredentialStore::in_dir(dir.path());
        std::fs::write(store.path(), b"{ not json").unwrap();

        let err = store.get_server_credentials().await.unwrap_err();
        assert_eq!(err.code(), "store_unavailable");
    }

    #[tokio::test]
    async fn unwritable_location_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let store = JsonFileCredentialStore::in_dir(blocker.join("sub"));

        let err = store
            .save_server_credentials(&credentials())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "store_write_failed");
    }
}
