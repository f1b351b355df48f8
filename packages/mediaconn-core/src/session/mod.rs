//! Reconnect-capable connection to one server.
//!
//! [`ConnectionSession`] ties the resolver, a channel transport and the
//! credential store together:
//!
//! ```text
//! Idle → Resolving → Opening → Open → Closed ─┐
//!          ▲                                  │ start()
//!          └──────────────────────────────────┘
//! any state ── dispose() ──▶ Disposed
//! ```
//!
//! The session never reconnects on its own. When the channel closes it
//! reports [`SessionEvent::Disconnected`] and waits for the caller to call
//! [`ConnectionSession::start`] again (see [`crate::retry`]).

mod subscribers;

pub use subscribers::{SessionEvent, Subscription};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::{ClientContext, UrlBuilder};
use crate::credentials::CredentialStore;
use crate::error::ErrorCode;
use crate::model::ServerRecord;
use crate::resolver::{AddressResolver, ResolveError};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::transport::{
    ChannelEvent, ChannelTransport, Frame, TransportError, TransportFactory,
};
use subscribers::SubscriberSet;

// ─────────────────────────────────────────────────────────────────────────────
// State & Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a [`ConnectionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Resolving,
    Opening,
    Open,
    Closed,
    /// Terminal.
    Disposed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Resolving => write!(f, "resolving"),
            Self::Opening => write!(f, "opening"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// Errors surfaced by [`ConnectionSession`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No address could be selected.
    #[error(transparent)]
    ConnectionUnavailable(#[from] ResolveError),

    /// The selected address was found but the channel did not open.
    #[error("failed to open channel: {0}")]
    Connect(#[source] TransportError),

    /// The channel rejected an outbound frame.
    #[error("send failed: {0}")]
    Send(#[source] TransportError),

    /// `send` was called while the session was not Open.
    #[error("session is not connected (state: {0})")]
    NotConnected(SessionState),

    /// `start` was called while a connection is in progress or open.
    #[error("session is already {0}")]
    AlreadyActive(SessionState),

    /// The session was disposed.
    #[error("session disposed")]
    Disposed,
}

impl SessionError {
    /// Returns true if calling `start` again later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionUnavailable(e) => e.is_retryable(),
            Self::Connect(_) => true,
            Self::Send(_) | Self::NotConnected(_) | Self::AlreadyActive(_) | Self::Disposed => {
                false
            }
        }
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::ConnectionUnavailable(e) => e.code(),
            Self::Connect(e) | Self::Send(e) => e.code(),
            Self::NotConnected(_) => "not_connected",
            Self::AlreadyActive(_) => "already_active",
            Self::Disposed => "disposed",
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Collaborators shared by sessions.
///
/// Sessions created from clones of the same services persist through one
/// lock, so concurrent connects never overwrite each other's records.
#[derive(Clone)]
pub struct SessionServices {
    pub resolver: Arc<AddressResolver>,
    pub transports: Arc<dyn TransportFactory>,
    pub store: Arc<dyn CredentialStore>,
    pub context: ClientContext,
    pub spawner: TokioSpawner,
    /// Held across load, merge and save of the credential store.
    store_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SessionServices {
    pub fn new(
        resolver: Arc<AddressResolver>,
        transports: Arc<dyn TransportFactory>,
        store: Arc<dyn CredentialStore>,
        context: ClientContext,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            resolver,
            transports,
            store,
            context,
            spawner,
            store_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

struct Inner {
    services: SessionServices,
    state: Mutex<SessionState>,
    record: RwLock<ServerRecord>,
    /// Active transport, exclusively owned. Replaced on every `start`.
    channel: Mutex<Option<Arc<dyn ChannelTransport>>>,
    /// Bumped per channel so events from a replaced channel are ignored.
    generation: AtomicU64,
    subscribers: Arc<SubscriberSet>,
}

/// A logical connection to one server.
///
/// Dropping the session disposes it.
pub struct ConnectionSession {
    inner: Arc<Inner>,
}

impl ConnectionSession {
    /// Creates an Idle session for `record`.
    pub fn new(record: ServerRecord, services: SessionServices) -> Self {
        Self {
            inner: Arc::new(Inner {
                services,
                state: Mutex::new(SessionState::Idle),
                record: RwLock::new(record),
                channel: Mutex::new(None),
                generation: AtomicU64::new(0),
                subscribers: Arc::new(SubscriberSet::default()),
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Returns the in-memory copy of the server record.
    ///
    /// # Errors
    ///
    /// [`SessionError::Disposed`] after [`dispose`](Self::dispose).
    pub fn record(&self) -> SessionResult<ServerRecord> {
        self.inner.ensure_live()?;
        Ok(self.inner.record.read().clone())
    }

    /// Registers a subscriber. Dropping the returned handle unsubscribes.
    ///
    /// # Errors
    ///
    /// [`SessionError::Disposed`] after [`dispose`](Self::dispose).
    pub fn subscribe(&self) -> SessionResult<Subscription> {
        self.inner.ensure_live()?;
        Ok(self.inner.subscribers.subscribe())
    }

    /// Resolves an address and opens the channel.
    ///
    /// Allowed from Idle and Closed. On success the session is Open and the
    /// refreshed record has been handed to the credential store (store
    /// failures are only logged).
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectionUnavailable`] if no address answered; the
    ///   session is left Closed.
    /// - [`SessionError::Connect`] if the channel did not open; the session
    ///   is left Closed.
    /// - [`SessionError::AlreadyActive`] from Resolving, Opening or Open.
    /// - [`SessionError::Disposed`] if disposed before or during the call.
    pub async fn start(&self, cancel: &CancellationToken) -> SessionResult<()> {
        let inner = &self.inner;
        inner.begin_start()?;

        let record = inner.record.read().clone();
        let resolution = match inner.services.resolver.resolve(&record, cancel).await {
            Ok(resolution) => resolution,
            Err(e) => {
                inner.transition(SessionState::Closed)?;
                log::warn!("[Session] Connection unavailable: {}", e);
                return Err(SessionError::ConnectionUnavailable(e));
            }
        };

        *inner.record.write() = resolution.record.clone();
        inner.transition(SessionState::Opening)?;

        let url = UrlBuilder::new(&resolution.address).websocket_url(
            resolution.record.access_token.as_deref(),
            &inner.services.context.device_id,
        );
        let url = match url {
            Ok(url) => url,
            Err(e) => {
                inner.transition(SessionState::Closed)?;
                return Err(SessionError::Connect(e));
            }
        };

        let transport = inner.services.transports.create();
        let events = transport.take_events();
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.replace_channel(Some(Arc::clone(&transport)));

        if let Err(e) = transport.connect(&url, cancel).await {
            inner.release_channel(generation);
            inner.transition(SessionState::Closed)?;
            log::warn!("[Session] Failed to open channel to {}: {}", resolution.address, e);
            return Err(SessionError::Connect(e));
        }

        if let Err(e) = inner.transition(SessionState::Open) {
            transport.dispose();
            return Err(e);
        }
        if let Some(events) = events {
            let weak = Arc::downgrade(inner);
            inner
                .services
                .spawner
                .spawn(pump(weak, generation, events));
        }

        log::info!(
            "[Session] Connected to '{}' via {} ({})",
            resolution.record.name,
            resolution.mode,
            resolution.address
        );
        inner.persist(resolution.record).await;
        Ok(())
    }

    /// Sends a frame over the open channel.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] in any state other than Open,
    /// including Disposed.
    pub async fn send(&self, frame: Frame, cancel: &CancellationToken) -> SessionResult<()> {
        let state = self.state();
        if state != SessionState::Open {
            return Err(SessionError::NotConnected(state));
        }
        let channel = self
            .inner
            .channel
            .lock()
            .clone()
            .ok_or(SessionError::NotConnected(state))?;

        match channel.send(frame, cancel).await {
            Ok(()) => Ok(()),
            Err(TransportError::NotOpen) => Err(SessionError::NotConnected(self.state())),
            Err(e) => Err(SessionError::Send(e)),
        }
    }

    /// Closes the channel, drops every subscriber and moves to Disposed.
    /// Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl Inner {
    fn ensure_live(&self) -> SessionResult<()> {
        if *self.state.lock() == SessionState::Disposed {
            return Err(SessionError::Disposed);
        }
        Ok(())
    }

    fn begin_start(&self) -> SessionResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                SessionState::Disposed => return Err(SessionError::Disposed),
                SessionState::Idle | SessionState::Closed => *state = SessionState::Resolving,
                active => return Err(SessionError::AlreadyActive(active)),
            }
        }
        self.announce(SessionState::Resolving);
        Ok(())
    }

    /// Moves to `to` unless the session was disposed meanwhile.
    fn transition(&self, to: SessionState) -> SessionResult<()> {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Disposed {
                return Err(SessionError::Disposed);
            }
            let from = *state;
            tracing::debug!(%from, %to, "session state changed");
            *state = to;
        }
        self.announce(to);
        Ok(())
    }

    fn announce(&self, state: SessionState) {
        log::debug!("[Session] State: {}", state);
        self.subscribers.publish(SessionEvent::StateChanged(state));
    }

    fn replace_channel(&self, channel: Option<Arc<dyn ChannelTransport>>) {
        let previous = std::mem::replace(&mut *self.channel.lock(), channel);
        if let Some(previous) = previous {
            previous.dispose();
        }
    }

    /// Drops the channel if it still belongs to `generation`.
    fn release_channel(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.replace_channel(None);
        }
    }

    fn on_message(&self, generation: u64, frame: Frame) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if *self.state.lock() == SessionState::Open {
            self.subscribers.publish(SessionEvent::Message(frame));
        }
    }

    fn on_channel_closed(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("[Session] Ignoring close of stale channel {}", generation);
            return;
        }
        self.release_channel(generation);
        if self.transition(SessionState::Closed).is_ok() {
            log::info!("[Session] Channel closed");
            self.subscribers.publish(SessionEvent::Disconnected);
        }
    }

    async fn persist(&self, record: ServerRecord) {
        let _lock = self.services.store_lock.lock().await;
        let store = &self.services.store;
        let mut credentials = match store.get_server_credentials().await {
            Ok(credentials) => credentials,
            Err(e) => {
                log::warn!("[Session] {}; treating as no known servers", e);
                Default::default()
            }
        };
        credentials.add_or_update_server(record);
        if let Err(e) = store.save_server_credentials(&credentials).await {
            log::warn!("[Session] Failed to persist server record: {}", e);
        }
    }

    fn dispose(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), SessionState::Disposed);
        if previous == SessionState::Disposed {
            return;
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
        let channel = self.channel.lock().take();
        if let Some(channel) = channel {
            channel.dispose();
        }

        self.subscribers
            .publish(SessionEvent::StateChanged(SessionState::Disposed));
        self.subscribers.clear();
        log::info!("[Session] Disposed (was {})", previous);
    }
}

/// Forwards one channel's events to the session, in order.
async fn pump(
    session: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        match event {
            ChannelEvent::Message(frame) => inner.on_message(generation, frame),
            ChannelEvent::Closed => {
                inner.on_channel_closed(generation);
                break;
            }
        }
    }
}
