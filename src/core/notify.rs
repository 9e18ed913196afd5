//! Purpose: Fan a payload-free "update" signal out to every connected client.
//! Exports: `Update`, `UpdateBus`.
//! Role: Process-wide change notifier; clients re-fetch, they never consume deltas.
//! Invariants: Sending never fails or blocks; a missing audience is ignored.
//! Invariants: Disconnected subscribers receive nothing; correctness never depends on notify.

use tokio::sync::broadcast;

/// The broadcast signal. Deliberately carries no payload: receivers re-fetch
/// the full list, so collapsing consecutive signals loses nothing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Update;

#[derive(Clone)]
pub struct UpdateBus {
    sender: broadcast::Sender<Update>,
}

impl UpdateBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.sender.subscribe()
    }

    pub fn notify(&self) {
        // Lagging or absent listeners are ignored to avoid blocking mutations.
        let _ = self.sender.send(Update);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
