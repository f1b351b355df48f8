//! Per-session subscriber registry.
//!
//! - `SubscriberSet`: fan-out of session events to every live subscriber
//! - `Subscription`: RAII handle that unregisters when dropped

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::SessionState;
use crate::transport::Frame;

/// Something a session reports to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Inbound message, delivered in arrival order.
    Message(Frame),
    /// The channel closed. The session stays Closed until `start` is called.
    Disconnected,
}

/// Subscribers of one session.
#[derive(Debug, Default)]
pub(crate) struct SubscriberSet {
    subscribers: DashMap<u64, mpsc::UnboundedSender<SessionEvent>>,
    next_id: AtomicU64,
}

impl SubscriberSet {
    pub(crate) fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        log::debug!(
            "[Session] Subscriber {} added (total: {})",
            id,
            self.subscribers.len()
        );

        Subscription {
            id,
            events: rx,
            set: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            log::debug!(
                "[Session] Subscriber {} removed (remaining: {})",
                id,
                self.subscribers.len()
            );
        }
    }

    /// Sends `event` to every subscriber, dropping those that went away.
    pub(crate) fn publish(&self, event: SessionEvent) {
        self.subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Drops every subscriber; their streams end.
    pub(crate) fn clear(&self) {
        self.subscribers.clear();
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}

/// Receiving end of a session subscription.
///
/// Dropping it unsubscribes. The stream ends (`recv` returns `None`) once
/// the session is disposed.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    set: Weak<SubscriberSet>,
}

impl Subscription {
    /// Waits for the next event.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.unsubscribe(self.id);
        }
    }
}
