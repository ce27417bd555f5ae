//! In-process message bus owned by a worker.
//!
//! Broadcast semantics: every subscriber sees every message published after
//! it subscribed, in publish order. Closing the bus drops the sender so
//! subscribers drain what is buffered and then observe the channel closed.

use std::sync::Arc;

use multimind_protocol::BusMessage;
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Cloneable handle to a worker's bus.
#[derive(Clone)]
pub struct MessageBus {
    tx: Arc<RwLock<Option<broadcast::Sender<BusMessage>>>>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx: Arc::new(RwLock::new(Some(tx))),
        }
    }

    /// Publish to every current subscriber. Returns how many received it
    /// (0 when nobody listens or the bus is closed).
    pub fn publish(&self, message: BusMessage) -> usize {
        match self.tx.read().as_ref() {
            Some(tx) => tx.send(message).unwrap_or(0),
            None => 0,
        }
    }

    /// `None` once the bus has been closed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<BusMessage>> {
        self.tx.read().as_ref().map(|tx| tx.subscribe())
    }

    pub fn close(&self) {
        self.tx.write().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.read().as_ref().map_or(0, |tx| tx.receiver_count())
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("closed", &self.is_closed())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
