//! Change notifications for the current loop snapshot.
//!
//! Subscribers only learn *that* the snapshot changed; they read the new one
//! through `LoopHandle::current_snapshot`. Dropping a [`Subscription`]
//! deregisters it.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Marker sent once per accepted snapshot replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopChanged;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<LoopChanged>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Deliver one change to every current subscriber. Having none is fine.
    pub fn notify(&self) {
        let _ = self.tx.send(LoopChanged);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<LoopChanged>,
}

impl Subscription {
    /// Wait for the next change. Returns `false` once the notifier is gone.
    ///
    /// A subscriber that fell behind sees the missed changes as one.
    pub async fn changed(&mut self) -> bool {
        match self.rx.recv().await {
            Ok(LoopChanged) => true,
            Err(RecvError::Lagged(_)) => {
                self.drain();
                true
            }
            Err(RecvError::Closed) => false,
        }
    }

    /// Non-blocking variant of [`changed`](Self::changed).
    pub fn try_changed(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(LoopChanged) => true,
            Err(TryRecvError::Lagged(_)) => {
                self.drain();
                true
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
        }
    }

    fn drain(&mut self) {
        while let Ok(_) | Err(TryRecvError::Lagged(_)) = self.rx.try_recv() {}
    }

    pub fn unsubscribe(self) {}
}
