//! Transport seam between a scope and its client.
//!
//! A [`Channel`] carries opaque byte messages in both directions. The scope
//! subscribes one handler for inbound messages and publishes outbound ones.
//! Transports (websocket, HTTP long-poll, in-process) implement this trait;
//! [`MemoryChannel`] is the in-process one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::RuntimeError;

/// Inbound message handler installed by [`Channel::subscribe`].
pub type MessageHandler = Arc<dyn Fn(&[u8]) -> Result<(), RuntimeError> + Send + Sync>;

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The client side is gone.
    #[error("channel closed")]
    Closed,
    /// Transport-specific failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Bidirectional message pipe.
pub trait Channel: Send + Sync {
    /// Install the inbound handler. Dropping the returned subscription
    /// removes it.
    fn subscribe(&self, handler: MessageHandler) -> Subscription;

    /// Send one message to the client. Must not block on the client.
    fn publish(&self, message: &[u8]) -> Result<(), ChannelError>;
}

/// Cancellation handle of an inbound subscription.
///
/// Unsubscribes on [`unsubscribe`](Self::unsubscribe) or drop, whichever
/// comes first.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a cancel action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Remove the handler now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryChannel
// ─────────────────────────────────────────────────────────────────────────────

type Slot = Arc<Mutex<Option<(u64, MessageHandler)>>>;

/// In-process channel.
///
/// [`deliver`](Self::deliver) plays the client sending a message; published
/// messages come out of the receiver returned by [`new`](Self::new).
pub struct MemoryChannel {
    handler: Slot,
    next_subscription: AtomicU64,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
}

impl MemoryChannel {
    /// Create a channel and the receiver of its outbound messages.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            handler: Arc::new(Mutex::new(None)),
            next_subscription: AtomicU64::new(0),
            outbound: tx,
            closed: AtomicBool::new(false),
        });
        (channel, rx)
    }

    /// Hand an inbound message to the subscribed handler.
    ///
    /// The handler runs on the calling thread, outside any channel lock.
    pub fn deliver(&self, message: &[u8]) -> Result<(), RuntimeError> {
        let handler = self.handler.lock().as_ref().map(|(_, h)| h.clone());
        match handler {
            Some(handler) => handler(message),
            None => Err(RuntimeError::NotSubscribed),
        }
    }

    /// Whether a handler is installed.
    pub fn is_subscribed(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Make further publishes fail with [`ChannelError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Channel for MemoryChannel {
    fn subscribe(&self, handler: MessageHandler) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        *self.handler.lock() = Some((id, handler));
        let slot = Arc::downgrade(&self.handler);
        Subscription::new(move || {
            let Some(slot) = slot.upgrade() else {
                return;
            };
            let mut guard = slot.lock();
            // A newer subscription may have replaced this one.
            if guard.as_ref().is_some_and(|(current, _)| *current == id) {
                *guard = None;
                debug!(subscription = id, "memory channel unsubscribed");
            }
        })
    }

    fn publish(&self, message: &[u8]) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        self.outbound
            .send(message.to_vec())
            .map_err(|_| ChannelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;

    fn counting_handler(count: &Arc<AtomicUsize>) -> MessageHandler {
        let count = count.clone();
        Arc::new(move |_| {
            let _ = count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn deliver_without_subscriber_fails() {
        let (channel, _rx) = MemoryChannel::new();
        assert_matches!(channel.deliver(b"x"), Err(RuntimeError::NotSubscribed));
    }

    #[test]
    fn deliver_reaches_handler() {
        let (channel, _rx) = MemoryChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _sub = channel.subscribe(counting_handler(&count));
        channel.deliver(b"x").unwrap();
        channel.deliver(b"y").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let (channel, _rx) = MemoryChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = channel.subscribe(counting_handler(&count));
        assert!(channel.is_subscribed());
        drop(sub);
        assert!(!channel.is_subscribed());
    }

    #[test]
    fn stale_subscription_does_not_remove_newer() {
        let (channel, _rx) = MemoryChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let old = channel.subscribe(counting_handler(&count));
        let _new = channel.subscribe(counting_handler(&count));
        old.unsubscribe();
        assert!(channel.is_subscribed());
    }

    #[test]
    fn publish_goes_to_receiver() {
        let (channel, mut rx) = MemoryChannel::new();
        channel.publish(b"hello").unwrap();
        assert_eq!(rx.try_recv().unwrap(), b"hello");
    }

    #[test]
    fn publish_after_close_fails() {
        let (channel, _rx) = MemoryChannel::new();
        channel.close();
        assert_matches!(channel.publish(b"x"), Err(ChannelError::Closed));
    }

    #[test]
    fn publish_after_receiver_dropped_fails() {
        let (channel, rx) = MemoryChannel::new();
        drop(rx);
        assert_matches!(channel.publish(b"x"), Err(ChannelError::Closed));
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let (channel, mut rx) = MemoryChannel::new();
        let weak = Arc::downgrade(&channel);
        let _sub = channel.subscribe(Arc::new(move |msg| {
            if let Some(channel) = weak.upgrade() {
                channel.publish(msg)?;
            }
            Ok(())
        }));
        channel.deliver(b"echo").unwrap();
        assert_eq!(rx.try_recv().unwrap(), b"echo");
    }
}
