//! Watch-backed cooperative cancellation.
//!
//! A [`ShutdownTrigger`] owns the root of a cancellation tree; every
//! long-lived task holds a cloned [`ShutdownToken`] and selects on
//! [`ShutdownToken::cancelled`] alongside its own work.

use tokio::sync::watch;

/// Create a connected trigger/token pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownToken { rx })
}

/// Owning side: cancels every derived [`ShutdownToken`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn cancel(&self) {
        // Receivers observe the value change; send failure means every
        // token is already gone, which is an acceptable no-op.
        let _ = self.tx.send(true);
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Cloneable cancellation observer.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the owning trigger fires (or is dropped).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Trigger dropped without firing: treat as cancelled so
                // orphaned tasks unwind instead of hanging.
                return;
            }
        }
    }
}
