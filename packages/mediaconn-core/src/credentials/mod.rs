//! Durable storage of known servers.
//!
//! The session only depends on the [`CredentialStore`] trait. Failures are
//! typed so callers can treat a read failure as "no known servers" and a
//! write failure as non-fatal.

mod json_file;
mod memory;

pub use json_file::JsonFileCredentialStore;
pub use memory::MemoryCredentialStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorCode;
use crate::model::ServerCredentials;

/// Errors raised by credential store backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backing storage could not be read or parsed.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    /// Backing storage could not be written.
    #[error("failed to save credentials: {0}")]
    Write(String),
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "store_unavailable",
            Self::Write(_) => "store_write_failed",
        }
    }
}

/// Result type for credential store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Loads and saves the set of known servers.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns every stored server and connect identity.
    async fn get_server_credentials(&self) -> StoreResult<ServerCredentials>;

    /// Replaces the stored credentials.
    async fn save_server_credentials(&self, credentials: &ServerCredentials) -> StoreResult<()>;
}
