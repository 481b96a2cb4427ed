//! Per-handle signal bus.
//!
//! Unlike a process-wide broadcast bus, [`HandleEventBus`] fans each
//! signal out only to subscribers registered under the *same key*
//! (a handle-name or identity id), giving per-handle FIFO delivery
//! instead of global broadcast.

use crate::signal::Signal;
use dashmap::DashMap;
use std::hash::Hash;
use tokio::sync::broadcast;
use tracing::{trace, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Registry of per-key broadcast channels for [`Signal`] delivery.
pub struct HandleEventBus<K> {
    channels: DashMap<K, broadcast::Sender<Signal>>,
}

impl<K> Default for HandleEventBus<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> HandleEventBus<K>
where
    K: Eq + Hash + Clone,
{
    /// A bus with no registered handles.
    #[must_use]
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    /// Emit `signal` to every subscriber of `key`. A key with no
    /// subscribers (or no channel at all, e.g. the handle was never
    /// subscribed to) is a no-op.
    pub fn emit(&self, key: &K, signal: Signal) {
        if let Some(sender) = self.channels.get(key) {
            trace!(subscribers = sender.receiver_count(), "emitting signal");
            // A send error just means no receivers are currently live.
            let _ = sender.send(signal);
        }
    }

    /// Broadcast `signal` to *every* registered key (used for truly
    /// global events, not per-identity ones — those fan out through an
    /// explicit observer set instead, see `signon_identity::Identity`).
    pub fn broadcast_all(&self, signal: Signal) {
        for entry in &self.channels {
            let _ = entry.value().send(signal.clone());
        }
    }

    /// Subscribe to signals for `key`, creating its channel if this is
    /// the first subscriber.
    pub fn subscribe(&self, key: K) -> HandleEventReceiver {
        let sender = self
            .channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        HandleEventReceiver { receiver: sender.subscribe() }
    }

    /// Drop the channel for `key` entirely — called once a handle is
    /// fully torn down so its entry doesn't linger in the registry.
    pub fn deregister(&self, key: &K) {
        self.channels.remove(key);
    }
}

impl<K> std::fmt::Debug for HandleEventBus<K>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleEventBus").field("keys", &self.channels.len()).finish()
    }
}

/// A subscription to one handle's signal stream.
pub struct HandleEventReceiver {
    receiver: broadcast::Receiver<Signal>,
}

impl HandleEventReceiver {
    /// Wait for the next signal. Returns `None` once the bus entry for
    /// this handle has been dropped and no signals are pending.
    pub async fn recv(&mut self) -> Option<Signal> {
        loop {
            match self.receiver.recv().await {
                Ok(signal) => return Some(signal),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "handle event receiver lagged, signals dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::InfoUpdatedKind;

    #[tokio::test]
    async fn emit_only_reaches_subscribers_of_the_same_key() {
        let bus: HandleEventBus<String> = HandleEventBus::new();
        let mut subscriber_a = bus.subscribe("handle-a".to_string());
        let mut subscriber_b = bus.subscribe("handle-b".to_string());

        bus.emit(&"handle-a".to_string(), Signal::InfoUpdated(InfoUpdatedKind::Stored));

        let received = subscriber_a.recv().await.unwrap();
        assert!(matches!(received, Signal::InfoUpdated(InfoUpdatedKind::Stored)));
        assert!(subscriber_b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_all_reaches_every_registered_key() {
        let bus: HandleEventBus<u32> = HandleEventBus::new();
        let mut a = bus.subscribe(1);
        let mut b = bus.subscribe(2);

        bus.broadcast_all(Signal::Unregistered);

        assert!(matches!(a.recv().await.unwrap(), Signal::Unregistered));
        assert!(matches!(b.recv().await.unwrap(), Signal::Unregistered));
    }

    #[tokio::test]
    async fn deregister_drops_the_channel() {
        let bus: HandleEventBus<String> = HandleEventBus::new();
        let _subscriber = bus.subscribe("handle-a".to_string());
        bus.deregister(&"handle-a".to_string());
        // Emitting after deregistration is a silent no-op, not a panic.
        bus.emit(&"handle-a".to_string(), Signal::Unregistered);
    }
}
