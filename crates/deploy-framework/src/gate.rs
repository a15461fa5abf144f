//! # Traffic Gate
//!
//! Components that accept external traffic are *ready* once they could serve, but they
//! must not serve until the whole bootstrap succeeded. The [`TrafficGate`] is the switch
//! the orchestrator flips: it starts closed, is opened only after every component reported
//! ready, and is closed again on shutdown.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable handle over the process's "may serve traffic" flag.
#[derive(Debug, Clone)]
pub struct TrafficGate {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for TrafficGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficGate {
    /// Creates a closed gate.
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn open(&self) {
        self.sender.send_replace(true);
    }

    pub fn close(&self) {
        self.sender.send_replace(false);
    }

    pub fn is_open(&self) -> bool {
        *self.sender.borrow()
    }

    /// Waits until the gate is open. Returns immediately if it already is.
    pub async fn wait_open(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = receiver.wait_for(|open| *open).await;
    }

    /// Waits until the gate is closed. Returns immediately if it already is.
    pub async fn wait_closed(&self) {
        let mut receiver = self.sender.subscribe();
        let _ = receiver.wait_for(|open| !*open).await;
    }
}
