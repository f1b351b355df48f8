//! Client configuration.
//!
//! Every field has a default so partial YAML/JSON documents deserialize.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ClientContext;
use crate::crypto::{device_fingerprint, CryptoProvider};
use crate::resolver::ResolverConfig;
use crate::utils::non_blank;

/// Default per-address probe timeout.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Default bound on caller-side reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Tunables and device identity for one client instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-address probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
    /// Send Wake-on-LAN packets before re-probing a local address that failed.
    pub wake_on_lan: bool,
    pub client_name: String,
    pub client_version: String,
    /// Device name reported to the server. Defaults to the machine hostname.
    pub device_name: String,
    /// Stable device id. Derived from client and device name when unset.
    pub device_id: Option<String>,
    pub max_reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            wake_on_lan: true,
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            device_name: default_device_name(),
            device_id: None,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

fn default_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown-device".to_string())
}

impl ClientConfig {
    /// Returns the probe timeout as a [`Duration`].
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Returns the resolver settings derived from this config.
    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            probe_timeout: self.probe_timeout(),
            wake_on_lan: self.wake_on_lan,
        }
    }

    /// Returns the device identity, deriving the id when it is not configured.
    #[must_use]
    pub fn client_context(&self, crypto: &dyn CryptoProvider) -> ClientContext {
        let device_id = non_blank(self.device_id.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| {
                device_fingerprint(crypto, &[&self.client_name, &self.device_name])
            });

        ClientContext {
            client_name: self.client_name.clone(),
            client_version: self.client_version.clone(),
            device_name: self.device_name.clone(),
            device_id,
        }
    }
}
