//! WebSocket backend for [`ChannelTransport`].
//!
//! One reader task forwards inbound messages to the [`EventSink`] in arrival
//! order; one writer task drains an outbound queue and confirms each write.
//! Both stop when the connection token is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::{
    ChannelEvent, ChannelState, ChannelTransport, EventSink, Frame, FrameAssembler, MessageType,
    NativeState, TransportError, TransportFactory, TransportResult,
};
use crate::runtime::{TaskSpawner, TokioSpawner};

/// Outbound queue depth before `send` waits for the writer.
const OUTBOUND_QUEUE_SIZE: usize = 64;

struct Outbound {
    message: Message,
    done: oneshot::Sender<TransportResult<()>>,
}

/// A single WebSocket connection attempt.
pub struct WebSocketTransport {
    spawner: TokioSpawner,
    native: Arc<Mutex<NativeState>>,
    sink: EventSink,
    events: Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    assembler: Mutex<FrameAssembler>,
    /// Cancelled on dispose; parent of each connection's token.
    shutdown: CancellationToken,
    disposed: AtomicBool,
}

impl WebSocketTransport {
    pub fn new(spawner: TokioSpawner) -> Self {
        let (sink, events) = EventSink::channel();
        Self {
            spawner,
            native: Arc::new(Mutex::new(NativeState::None)),
            sink,
            events: Mutex::new(Some(events)),
            outbound: Mutex::new(None),
            assembler: Mutex::new(FrameAssembler::default()),
            shutdown: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        }
    }

    fn set_native(&self, state: NativeState) {
        *self.native.lock() = state;
    }

    fn fail_open(&self, err: TransportError) -> TransportError {
        self.set_native(NativeState::Closed);
        self.sink.close();
        err
    }

    /// Moves Connecting to Open unless `dispose` got there first.
    fn mark_open(&self) -> TransportResult<()> {
        let mut native = self.native.lock();
        if self.disposed.load(Ordering::SeqCst) || *native != NativeState::Connecting {
            return Err(TransportError::Connect(
                "transport disposed during handshake".to_string(),
            ));
        }
        *native = NativeState::Open;
        Ok(())
    }
}

fn to_message(frame: Frame) -> TransportResult<Message> {
    match frame.message_type {
        MessageType::Text => String::from_utf8(frame.payload.to_vec())
            .map(|text| Message::Text(text.into()))
            .map_err(|e| TransportError::InvalidFrame(format!("text frame is not UTF-8: {e}"))),
        MessageType::Binary => Ok(Message::Binary(frame.payload.to_vec().into())),
    }
}

#[async_trait]
impl ChannelTransport for WebSocketTransport {
    async fn connect(&self, url: &str, cancel: &CancellationToken) -> TransportResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("transport disposed".to_string()));
        }
        {
            let mut native = self.native.lock();
            if *native != NativeState::None {
                return Err(TransportError::Connect(format!(
                    "transport already used (state: {})",
                    ChannelState::from(*native)
                )));
            }
            *native = NativeState::Connecting;
        }

        log::debug!("[WebSocket] Connecting to {}", url);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.fail_open(TransportError::Cancelled)),
            _ = self.shutdown.cancelled() => {
                return Err(self.fail_open(TransportError::Connect("transport disposed".to_string())))
            }
            result = tokio_tungstenite::connect_async(url) => result,
        };

        let (stream, _response) =
            connected.map_err(|e| self.fail_open(TransportError::Connect(e.to_string())))?;

        let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE_SIZE);
        *self.outbound.lock() = Some(tx);
        if let Err(e) = self.mark_open() {
            self.outbound.lock().take();
            drop(stream);
            return Err(self.fail_open(e));
        }

        let (mut write, mut read) = stream.split();
        let connection = self.shutdown.child_token();

        // Writer
        let writer_token = connection.clone();
        self.spawner.spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_token.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    next = rx.recv() => {
                        let Some(outbound) = next else { break };
                        let result = write
                            .send(outbound.message)
                            .await
                            .map_err(|e| TransportError::Send(e.to_string()));
                        let failed = result.is_err();
                        let _ = outbound.done.send(result);
                        if failed {
                            writer_token.cancel();
                            break;
                        }
                    }
                }
            }
        });

        // Reader
        let native = Arc::clone(&self.native);
        let sink = self.sink.clone();
        self.spawner.spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = connection.cancelled() => break,
                    next = read.next() => next,
                };
                match next {
                    Some(Ok(Message::Text(text))) => sink.message(Frame::text(text.to_string())),
                    Some(Ok(Message::Binary(data))) => sink.message(Frame::binary(data.to_vec())),
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        log::info!("[WebSocket] Server closed connection: {:?}", frame);
                        break;
                    }
                    Some(Err(e)) => {
                        log::warn!("[WebSocket] Read error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
            *native.lock() = NativeState::Closed;
            connection.cancel();
            sink.close();
        });

        log::info!("[WebSocket] Connected to {}", url);
        Ok(())
    }

    async fn send(&self, frame: Frame, cancel: &CancellationToken) -> TransportResult<()> {
        if self.state() != ChannelState::Open {
            return Err(TransportError::NotOpen);
        }

        let Some(frame) = self.assembler.lock().push(frame)? else {
            return Ok(());
        };
        let message = to_message(frame)?;
        let tx = self
            .outbound
            .lock()
            .clone()
            .ok_or(TransportError::NotOpen)?;

        let (done_tx, done_rx) = oneshot::channel();
        let outbound = Outbound {
            message,
            done: done_tx,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            queued = tx.send(outbound) => {
                queued.map_err(|_| TransportError::Send("writer stopped".to_string()))?
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            done = done_rx => done.unwrap_or_else(|_| Err(TransportError::Send("writer stopped".to_string()))),
        }
    }

    fn state(&self) -> ChannelState {
        ChannelState::from(*self.native.lock())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ChannelEvent>> {
        self.events.lock().take()
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if matches!(self.state(), ChannelState::Open | ChannelState::Connecting) {
            log::info!("[WebSocket] Sending web socket close message");
        }

        self.shutdown.cancel();
        self.outbound.lock().take();
        self.set_native(NativeState::Closed);
        self.sink.close();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Creates a new [`WebSocketTransport`] per connection attempt.
#[derive(Clone)]
pub struct WebSocketTransportFactory {
    spawner: TokioSpawner,
}

impl WebSocketTransportFactory {
    pub fn new(spawner: TokioSpawner) -> Self {
        Self { spawner }
    }
}

impl TransportFactory for WebSocketTransportFactory {
    fn create(&self) -> Arc<dyn ChannelTransport> {
        Arc::new(WebSocketTransport::new(self.spawner.clone()))
    }
}
