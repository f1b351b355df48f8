//! Hand-written collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::context::ClientContext;
use crate::credentials::{CredentialStore, MemoryCredentialStore, StoreError, StoreResult};
use crate::model::{ProbedInfo, PublicSystemInfo, ServerCredentials, ServerRecord, WakeOnLanInfo};
use crate::probe::{CapabilityProbe, ProbeError, ProbeResult};
use crate::transport::{
    ChannelEvent, ChannelState, ChannelTransport, EventSink, Frame, TransportError,
    TransportFactory, TransportResult,
};
use crate::wake::{WakeError, WakeOnLan, WakeResult};

pub const LOCAL: &str = "http://192.168.1.5:8096";
pub const REMOTE: &str = "https://example.com:443";

/// Known server with a local and a remote address and no last mode.
pub fn den_record() -> ServerRecord {
    ServerRecord {
        id: "abc123".into(),
        name: "Old Name".into(),
        local_address: Some(LOCAL.into()),
        remote_address: Some(REMOTE.into()),
        user_id: Some("user-1".into()),
        access_token: Some("token-1".into()),
        ..Default::default()
    }
}

pub fn den_info() -> PublicSystemInfo {
    PublicSystemInfo {
        server_name: "Den".into(),
        id: "abc123".into(),
        ..Default::default()
    }
}

pub fn client_context() -> ClientContext {
    ClientContext {
        client_name: "mediaconn".into(),
        client_version: "0.1.0".into(),
        device_name: "test-device".into(),
        device_id: "dev-1".into(),
    }
}

/// Waits for a condition that another task makes true.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Probe
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum ProbeBehavior {
    Succeed(PublicSystemInfo),
    Fail(ProbeError),
    /// Answers after the delay.
    Delay(Duration, PublicSystemInfo),
    /// Answers once the gate is notified.
    Gate(Arc<Notify>, PublicSystemInfo),
    /// Never answers.
    Hang,
}

/// Probe scripted per address. Unknown addresses are unreachable.
#[derive(Default)]
pub struct MockProbe {
    behaviors: Mutex<HashMap<String, ProbeBehavior>>,
    calls: AtomicUsize,
}

impl MockProbe {
    pub fn set(&self, address: &str, behavior: ProbeBehavior) {
        self.behaviors.lock().insert(address.to_string(), behavior);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityProbe for MockProbe {
    async fn get_public_system_info(
        &self,
        address: &str,
        _access_token: Option<&str>,
        _timeout: Duration,
    ) -> ProbeResult<ProbedInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behaviors.lock().get(address).cloned();
        match behavior {
            Some(ProbeBehavior::Succeed(info)) => Ok(info.into()),
            Some(ProbeBehavior::Fail(e)) => Err(e),
            Some(ProbeBehavior::Delay(delay, info)) => {
                tokio::time::sleep(delay).await;
                Ok(info.into())
            }
            Some(ProbeBehavior::Gate(gate, info)) => {
                gate.notified().await;
                Ok(info.into())
            }
            Some(ProbeBehavior::Hang) => std::future::pending().await,
            None => Err(ProbeError::Unreachable(address.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wake-on-LAN
// ─────────────────────────────────────────────────────────────────────────────

/// Records every MAC it was asked to wake.
#[derive(Default)]
pub struct MockWaker {
    woken: Mutex<Vec<String>>,
    fail: bool,
}

impl MockWaker {
    pub fn failing() -> Self {
        Self {
            woken: Mutex::default(),
            fail: true,
        }
    }

    pub fn woken(&self) -> Vec<String> {
        self.woken.lock().clone()
    }
}

#[async_trait]
impl WakeOnLan for MockWaker {
    async fn wake(&self, info: &WakeOnLanInfo) -> WakeResult<()> {
        self.woken.lock().push(info.mac_address.clone());
        if self.fail {
            return Err(WakeError::Socket("network down".into()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory transport driven by the test.
pub struct MockTransport {
    state: Mutex<ChannelState>,
    sink: EventSink,
    events: Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>,
    fail_connect: bool,
    gate: Option<Arc<Notify>>,
    url: Mutex<Option<String>>,
    sent: Mutex<Vec<Frame>>,
    disposals: AtomicUsize,
}

impl MockTransport {
    fn new(fail_connect: bool, gate: Option<Arc<Notify>>) -> Self {
        let (sink, events) = EventSink::channel();
        Self {
            state: Mutex::new(ChannelState::None),
            sink,
            events: Mutex::new(Some(events)),
            fail_connect,
            gate,
            url: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            disposals: AtomicUsize::new(0),
        }
    }

    /// Delivers an inbound text message.
    pub fn push(&self, text: &str) {
        self.sink.message(Frame::text(text));
    }

    /// Simulates the server closing the channel.
    pub fn remote_close(&self) {
        *self.state.lock() = ChannelState::Closed;
        self.sink.close();
    }

    pub fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn connect(&self, url: &str, cancel: &CancellationToken) -> TransportResult<()> {
        *self.url.lock() = Some(url.to_string());
        *self.state.lock() = ChannelState::Connecting;

        if let Some(gate) = &self.gate {
            tokio::select! {
                _ = gate.notified() => {}
                _ = cancel.cancelled() => {
                    self.remote_close();
                    return Err(TransportError::Cancelled);
                }
            }
        }

        if self.fail_connect {
            self.remote_close();
            return Err(TransportError::Connect("connection refused".into()));
        }
        *self.state.lock() = ChannelState::Open;
        Ok(())
    }

    async fn send(&self, frame: Frame, _cancel: &CancellationToken) -> TransportResult<()> {
        if *self.state.lock() != ChannelState::Open {
            return Err(TransportError::NotOpen);
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ChannelEvent>> {
        self.events.lock().take()
    }

    fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        self.remote_close();
    }
}

/// Factory that keeps every transport it created.
#[derive(Default)]
pub struct MockTransportFactory {
    created: Mutex<Vec<Arc<MockTransport>>>,
    fail_connect: bool,
    gate: Option<Arc<Notify>>,
}

impl MockTransportFactory {
    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().clone()
    }

    pub fn last(&self) -> Arc<MockTransport> {
        self.created.lock().last().cloned().unwrap()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self) -> Arc<dyn ChannelTransport> {
        let transport = Arc::new(MockTransport::new(self.fail_connect, self.gate.clone()));
        self.created.lock().push(Arc::clone(&transport));
        transport
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential Store
// ─────────────────────────────────────────────────────────────────────────────

/// Store whose reads and writes always fail.
pub struct FailingCredentialStore;

#[async_trait]
impl CredentialStore for FailingCredentialStore {
    async fn get_server_credentials(&self) -> StoreResult<ServerCredentials> {
        Err(StoreError::Unavailable("disk gone".into()))
    }

    async fn save_server_credentials(&self, _credentials: &ServerCredentials) -> StoreResult<()> {
        Err(StoreError::Write("disk gone".into()))
    }
}

/// In-memory store whose reads take a while, widening the window between
/// load and save.
pub struct SlowCredentialStore {
    inner: MemoryCredentialStore,
    read_delay: Duration,
}

impl SlowCredentialStore {
    pub fn new(read_delay: Duration) -> Self {
        Self {
            inner: MemoryCredentialStore::default(),
            read_delay,
        }
    }
}

#[async_trait]
impl CredentialStore for SlowCredentialStore {
    async fn get_server_credentials(&self) -> StoreResult<ServerCredentials> {
        tokio::time::sleep(self.read_delay).await;
        self.inner.get_server_credentials().await
    }

    async fn save_server_credentials(&self, credentials: &ServerCredentials) -> StoreResult<()> {
        self.inner.save_server_credentials(credentials).await
    }
}
