//! Duplex message channel abstraction.
//!
//! [`ChannelTransport`] is the seam between the session and a concrete
//! socket library. Backends translate their own state vocabulary into
//! [`ChannelState`] through [`NativeState`], so nothing above this module
//! sees backend-specific names.
//!
//! Inbound traffic is delivered through an event channel taken once with
//! [`ChannelTransport::take_events`]. Each transport instance emits
//! [`ChannelEvent::Closed`] exactly once, including when `connect` failed.

mod websocket;

pub use websocket::{WebSocketTransport, WebSocketTransportFactory};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorCode;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by channel transports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The socket URL could not be built or parsed.
    #[error("invalid socket URL: {0}")]
    InvalidUrl(String),

    /// The channel failed before reaching Open.
    #[error("failed to open channel: {0}")]
    Connect(String),

    /// The operation needs an Open channel.
    #[error("channel is not open")]
    NotOpen,

    /// A frame could not be encoded or did not continue the pending message.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The frame was accepted but could not be written.
    #[error("send failed: {0}")]
    Send(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::Connect(_) => "connect_failed",
            Self::NotOpen => "not_open",
            Self::InvalidFrame(_) => "invalid_frame",
            Self::Send(_) => "send_failed",
            Self::Cancelled => "transport_cancelled",
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Canonical channel state seen by the session.
///
/// Progresses `None → Connecting → Open → Closed`. A reconnect uses a new
/// transport instance rather than reviving a closed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    None,
    Connecting,
    Open,
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Raw state reported by a socket backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeState {
    None,
    Connecting,
    Open,
    Closing,
    Closed,
    /// Anything the backend reports that has no canonical meaning.
    Unknown,
}

impl NativeState {
    /// Parses a backend state name (case-insensitive).
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "none" => Self::None,
            "connecting" => Self::Connecting,
            "open" => Self::Open,
            "closing" => Self::Closing,
            "closed" => Self::Closed,
            _ => Self::Unknown,
        }
    }
}

impl From<NativeState> for ChannelState {
    fn from(native: NativeState) -> Self {
        match native {
            NativeState::Closed | NativeState::Closing => ChannelState::Closed,
            NativeState::Connecting => ChannelState::Connecting,
            NativeState::Open => ChannelState::Open,
            NativeState::None | NativeState::Unknown => ChannelState::None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frames & Events
// ─────────────────────────────────────────────────────────────────────────────

/// Transport-level message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Text,
    Binary,
}

/// One opaque message or message fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
    pub message_type: MessageType,
    /// False for every fragment except the last one of a message.
    pub is_final: bool,
}

impl Frame {
    /// Creates a complete text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: Bytes::from(text.into()),
            message_type: MessageType::Text,
            is_final: true,
        }
    }

    /// Creates a complete binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            payload: data.into(),
            message_type: MessageType::Binary,
            is_final: true,
        }
    }

    /// Marks this frame as a non-final fragment.
    #[must_use]
    pub fn fragment(mut self) -> Self {
        self.is_final = false;
        self
    }

    /// Returns the payload as UTF-8 for text frames.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self.message_type {
            MessageType::Text => std::str::from_utf8(&self.payload).ok(),
            MessageType::Binary => None,
        }
    }
}

/// Something the transport reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A complete inbound message, in arrival order.
    Message(Frame),
    /// The channel ended. Emitted once per transport instance.
    Closed,
}

/// Sending half of a transport's event channel.
///
/// Guarantees a single [`ChannelEvent::Closed`] and nothing after it.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    /// Creates a sink and the receiver its events arrive on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Delivers an inbound message unless the channel already closed.
    pub fn message(&self, frame: Frame) {
        if !self.closed.load(Ordering::SeqCst) {
            let _ = self.tx.send(ChannelEvent::Message(frame));
        }
    }

    /// Emits `Closed` on the first call; later calls are no-ops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(ChannelEvent::Closed);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Coalesces outbound fragments into complete messages.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Option<(MessageType, BytesMut)>,
}

impl FrameAssembler {
    /// Adds a frame. Returns the complete message once the final fragment
    /// arrives, or `None` while a message is still being built.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidFrame`] if the frame's type differs
    /// from the pending message's; the pending message is discarded.
    pub fn push(&mut self, frame: Frame) -> TransportResult<Option<Frame>> {
        let Some((message_type, mut buffer)) = self.pending.take() else {
            if frame.is_final {
                return Ok(Some(frame));
            }
            self.pending = Some((frame.message_type, BytesMut::from(&frame.payload[..])));
            return Ok(None);
        };

        if message_type != frame.message_type {
            return Err(TransportError::InvalidFrame(format!(
                "{:?} fragment inside a {:?} message",
                frame.message_type, message_type
            )));
        }

        buffer.extend_from_slice(&frame.payload);
        if !frame.is_final {
            self.pending = Some((message_type, buffer));
            return Ok(None);
        }

        Ok(Some(Frame {
            payload: buffer.freeze(),
            message_type,
            is_final: true,
        }))
    }

    /// Returns true while a fragmented message is incomplete.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport Traits
// ─────────────────────────────────────────────────────────────────────────────

/// A duplex message channel to one server.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Opens the channel. Resolves once Open.
    ///
    /// On failure or cancellation any partially opened resource is released
    /// and `Closed` is emitted; no messages are delivered for the attempt.
    async fn connect(&self, url: &str, cancel: &CancellationToken) -> TransportResult<()>;

    /// Sends a frame. Completes once the frame was written, never drops it
    /// silently.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotOpen`] unless the channel is Open.
    async fn send(&self, frame: Frame, cancel: &CancellationToken) -> TransportResult<()>;

    /// Current canonical state.
    fn state(&self) -> ChannelState;

    /// Takes the event receiver. Returns `None` after the first call.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ChannelEvent>>;

    /// Closes gracefully if Open or Connecting, then releases the socket.
    /// Idempotent.
    fn dispose(&self);
}

/// Creates a fresh transport for each connection attempt.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Arc<dyn ChannelTransport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_state_mapping() {
        let cases = [
            ("closed", ChannelState::Closed),
            ("Closing", ChannelState::Closed),
            ("connecting", ChannelState::Connecting),
            ("OPEN", ChannelState::Open),
            ("none", ChannelState::None),
            ("half-open", ChannelState::None),
            ("", ChannelState::None),
        ];
        for (tag, expected) in cases {
            assert_eq!(ChannelState::from(NativeState::from_tag(tag)), expected, "{tag}");
        }
    }

    #[test]
    fn sink_emits_closed_once_and_nothing_after() {
        let (sink, mut rx) = EventSink::channel();
        sink.message(Frame::text("A"));
        sink.close();
        sink.close();
        sink.message(Frame::text("late"));

        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::Message(Frame::text("A")));
        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::Closed);
        assert!(rx.try_recv().is_err());
        assert!(sink.is_closed());
    }

    #[test]
    fn assembler_passes_complete_frames_through() {
        let mut assembler = FrameAssembler::default();
        assert_eq!(
            assembler.push(Frame::binary(vec![1, 2])).unwrap(),
            Some(Frame::binary(vec![1, 2]))
        );
        assert!(!assembler.is_pending());
    }

    #[test]
    fn assembler_joins_fragments() {
        let mut assembler = FrameAssembler::default();
        assert_eq!(assembler.push(Frame::text("Hel").fragment()).unwrap(), None);
        assert_eq!(assembler.push(Frame::text("lo, ").fragment()).unwrap(), None);
        assert!(assembler.is_pending());

        let message = assembler.push(Frame::text("world")).unwrap().unwrap();
        assert_eq!(message.as_text(), Some("Hello, world"));
        assert!(message.is_final);
        assert!(!assembler.is_pending());
    }

    #[test]
    fn assembler_rejects_type_switch() {
        let mut assembler = FrameAssembler::default();
        assembler.push(Frame::text("a").fragment()).unwrap();
        let err = assembler.push(Frame::binary(vec![0])).unwrap_err();
        assert_eq!(err.code(), "invalid_frame");
        assert!(!assembler.is_pending());
    }

    #[test]
    fn binary_frames_have_no_text() {
        assert_eq!(Frame::binary(vec![0x41]).as_text(), None);
        assert_eq!(Frame::text("A").as_text(), Some("A"));
    }
}
