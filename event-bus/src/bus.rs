//! The bus contract: publish, subscribe, pull-based consumption.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::errors::BusError;

/// One delivered message. `key` is the partition key the producer used, so
/// consumers can re-key downstream publishes onto the same logical stream.
#[derive(Clone, Debug)]
pub struct Message {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Topic-addressed messaging with consumer groups.
///
/// Delivery is at-least-once: consumers must be idempotent. For a given
/// partition key, messages on one topic are observed in the producer's append
/// order; across keys and topics no ordering is guaranteed.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Appends a payload to a topic. `key` selects the partition stream.
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        key: Option<&str>,
    ) -> Result<(), BusError>;

    /// Joins `group` on the given topics. Each message on a topic is
    /// delivered to exactly one live member of each group.
    async fn subscribe(&self, group: &str, topics: &[&str]) -> Result<Subscription, BusError>;
}

/// Pull handle for a consumer-group membership.
///
/// Dropping the subscription (or calling [`Subscription::cancel`]) releases
/// the membership; the broker prunes it within one poll interval.
pub struct Subscription {
    pub(crate) rx: mpsc::UnboundedReceiver<Message>,
    pub(crate) cancel_tx: watch::Sender<bool>,
    pub(crate) cancel_rx: watch::Receiver<bool>,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Message>) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            rx,
            cancel_tx,
            cancel_rx,
        }
    }

    /// Blocks until the next message, or returns `None` once the
    /// subscription is cancelled or the broker is gone.
    pub async fn next(&mut self) -> Option<Message> {
        if *self.cancel_rx.borrow() {
            return None;
        }
        let mut cancel = self.cancel_rx.clone();
        tokio::select! {
            msg = self.rx.recv() => msg,
            _ = cancel.changed() => None,
        }
    }

    /// Returns a handle that can cancel this subscription from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Cancels in place: the pending `next()` returns `None` immediately.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

/// Cloneable cancellation handle for a [`Subscription`].
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}
