//! Hierarchical stop signals.
//!
//! A `StopSource` fires its own signal; a `StopToken` observes its source and
//! every ancestor. Stopping the root therefore reaches every unit derived from
//! it, while stopping one unit's source leaves its siblings running.

use futures::future::select_all;
use tokio::sync::watch;

pub struct StopSource {
    tx: watch::Sender<bool>,
    ancestors: Vec<watch::Receiver<bool>>,
}

impl StopSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            ancestors: Vec::new(),
        }
    }

    /// A source that also stops when `self` (or any ancestor) stops.
    pub fn child(&self) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            ancestors: self.token().receivers,
        }
    }

    pub fn token(&self) -> StopToken {
        let mut receivers = self.ancestors.clone();
        receivers.push(self.tx.subscribe());
        StopToken { receivers }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.token().is_stopped()
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a `StopSource`. Cheap to clone.
#[derive(Clone)]
pub struct StopToken {
    receivers: Vec<watch::Receiver<bool>>,
}

impl StopToken {
    pub fn is_stopped(&self) -> bool {
        self.receivers
            .iter()
            .any(|rx| *rx.borrow() || rx.has_changed().is_err())
    }

    /// Resolves once this token or any ancestor is stopped. A dropped source
    /// counts as stopped.
    pub async fn stopped(&self) {
        let waits = self.receivers.iter().cloned().map(|mut rx| {
            Box::pin(async move {
                let _ = rx.wait_for(|stopped| *stopped).await;
            })
        });
        select_all(waits).await;
    }

    /// Sleep for `duration` unless stopped first. Returns `false` when stopped.
    pub async fn sleep(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            _ = self.stopped() => false,
            _ = tokio::time::sleep(duration) => !self.is_stopped(),
        }
    }
}
