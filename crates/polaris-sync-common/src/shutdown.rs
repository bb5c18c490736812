//! Process-wide cancellation signal
//!
//! One `ShutdownSignal` is created at startup and cloned into every long-lived
//! task. Tasks observe it cooperatively, either by polling [`ShutdownSignal::is_shutdown`]
//! or by racing [`ShutdownSignal::cancelled`] against their own suspension point.

use std::sync::Arc;

use tokio::sync::watch;

/// Shutdown signal shared by all tasks
///
/// Backed by a watch channel so that tasks subscribing after the signal fired
/// still observe it.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Create a new, untriggered shutdown signal
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    /// Check if shutdown has been triggered
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once shutdown has been triggered
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
