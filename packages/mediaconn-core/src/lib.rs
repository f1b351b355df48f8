//! MediaConn Core - connection library for media-server clients.
//!
//! Keeps a logical connection to a media server that may be reachable
//! through several addresses (LAN, WAN, manually entered), remembers known
//! servers between runs, and maintains a live event socket once an address
//! is selected.
//!
//! # Architecture
//!
//! - [`model`]: Server records, persisted credentials and probe payloads
//! - [`resolver`]: Concurrent address probing with preference order
//! - [`transport`]: Duplex channel abstraction and the WebSocket backend
//! - [`session`]: Resolve → open → deliver state machine per server
//! - [`credentials`]: Credential store contract, memory and JSON backends
//! - [`probe`]: Server liveness probe over HTTP
//! - [`wake`]: Wake-on-LAN magic packets
//! - [`retry`]: Caller-side reconnect backoff
//! - [`error`]: Error codes and re-exported error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`CapabilityProbe`](probe::CapabilityProbe): Liveness checks
//! - [`ChannelTransport`](transport::ChannelTransport): Socket backends
//! - [`CredentialStore`](credentials::CredentialStore): Persistence
//! - [`CryptoProvider`](crypto::CryptoProvider): Hashing
//! - [`WakeOnLan`](wake::WakeOnLan): Wake packet sender
//!
//! [`bootstrap_client`] wires the default implementation of each.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod model;
pub mod probe;
pub mod resolver;
pub mod retry;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod utils;
pub mod wake;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use bootstrap::{bootstrap_client, BootstrappedClient};
pub use config::ClientConfig;
pub use context::{ClientContext, UrlBuilder};
pub use credentials::{CredentialStore, JsonFileCredentialStore, MemoryCredentialStore};
pub use crypto::{device_fingerprint, CryptoProvider, RustCryptoProvider};
pub use error::{
    ErrorCode, ProbeError, ResolveError, ServerRecordError, SessionError, StoreError,
    TransportError, WakeError,
};
pub use model::{
    ConnectionMode, ProbedInfo, PublicSystemInfo, ServerCredentials, ServerRecord, SystemInfo,
    UserLinkType, WakeOnLanInfo,
};
pub use probe::{CapabilityProbe, HttpCapabilityProbe};
pub use resolver::{AddressResolver, Resolution, ResolverConfig};
pub use retry::{start_with_backoff, BackoffPolicy};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{ConnectionSession, SessionEvent, SessionServices, SessionState, Subscription};
pub use transport::{
    ChannelEvent, ChannelState, ChannelTransport, Frame, MessageType, NativeState,
    TransportFactory, WebSocketTransport, WebSocketTransportFactory,
};
pub use utils::now_millis;
pub use wake::{UdpWakeOnLan, WakeOnLan};
