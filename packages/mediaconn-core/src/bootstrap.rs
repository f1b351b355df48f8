//! Client bootstrap and dependency wiring.
//!
//! The composition root: the one place where the concrete probe, wake
//! sender, hashing backend and transport factory are chosen and handed to
//! sessions. Tests build sessions from mocks instead.

use std::sync::Arc;

use reqwest::Client;

use crate::config::ClientConfig;
use crate::context::ClientContext;
use crate::credentials::CredentialStore;
use crate::crypto::{CryptoProvider, RustCryptoProvider};
use crate::model::ServerRecord;
use crate::probe::HttpCapabilityProbe;
use crate::resolver::AddressResolver;
use crate::retry::BackoffPolicy;
use crate::runtime::TokioSpawner;
use crate::session::{ConnectionSession, SessionServices};
use crate::transport::WebSocketTransportFactory;
use crate::wake::UdpWakeOnLan;

/// Wired services ready to create sessions.
#[derive(Clone)]
pub struct BootstrappedClient {
    pub config: ClientConfig,
    pub services: SessionServices,
    /// Shared HTTP client for connection pooling.
    http_client: Client,
}

impl BootstrappedClient {
    /// Returns the shared HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Device identity used for every request.
    pub fn context(&self) -> &ClientContext {
        &self.services.context
    }

    /// Creates an Idle session for `record`.
    #[must_use]
    pub fn session(&self, record: ServerRecord) -> ConnectionSession {
        ConnectionSession::new(record, self.services.clone())
    }

    /// Reconnect policy bounded by the configured attempt count.
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::with_max_attempts(self.config.max_reconnect_attempts)
    }
}

/// Wires the default backends around `store`.
///
/// # Errors
///
/// Returns the HTTP client build error (TLS backend initialisation).
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime context.
pub fn bootstrap_client(
    config: &ClientConfig,
    store: Arc<dyn CredentialStore>,
) -> Result<BootstrappedClient, reqwest::Error> {
    let spawner = TokioSpawner::current();
    let crypto: Arc<dyn CryptoProvider> = Arc::new(RustCryptoProvider);
    let context = config.client_context(crypto.as_ref());

    // Probe timeouts are enforced per call; the client itself has none.
    let http_client = Client::builder().build()?;

    let probe = Arc::new(HttpCapabilityProbe::new(
        http_client.clone(),
        context.clone(),
    ));
    let resolver = Arc::new(AddressResolver::new(
        probe,
        Arc::new(UdpWakeOnLan::default()),
        crypto,
        config.resolver_config(),
    ));

    log::info!(
        "[Bootstrap] Client {} {} on '{}' (device id {})",
        context.client_name,
        context.client_version,
        context.device_name,
        context.device_id
    );

    Ok(BootstrappedClient {
        config: config.clone(),
        services: SessionServices::new(
            resolver,
            Arc::new(WebSocketTransportFactory::new(spawner.clone())),
            store,
            context,
            spawner,
        ),
        http_client,
    })
}
