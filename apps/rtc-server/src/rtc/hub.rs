//! Hub for server-originated broadcasts.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connection loop
//! subscribes and hands every message to the dispatcher, which filters it
//! through the message's policy for that connection's identity.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::envelope::BroadcastMessage;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// Cloneable; lives in AppState.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Arc<BroadcastMessage>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Each connection calls this once to get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastMessage>> {
        self.sender.subscribe()
    }

    /// Publish to every live connection. Returns how many connections the
    /// message was queued for.
    pub fn publish(&self, message: BroadcastMessage) -> usize {
        // send() errors only when nobody is subscribed.
        self.sender.send(Arc::new(message)).unwrap_or(0)
    }
}
