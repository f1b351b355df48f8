use async_trait::async_trait;
use parking_lot::RwLock;

use super::{CredentialStore, StoreResult};
use crate::model::ServerCredentials;

/// In-process credential store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<ServerCredentials>,
}

impl MemoryCredentialStore {
    /// Creates a store pre-populated with `credentials`.
    #[must_use]
    pub fn new(credentials: ServerCredentials) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_server_credentials(&self) -> StoreResult<ServerCredentials> {
        Ok(self.credentials.read().clone())
    }

    async fn save_server_credentials(&self, credentials: &ServerCredentials) -> StoreResult<()> {
        *self.credentials.write() = credentials.clone();
        Ok(())
    }
}
