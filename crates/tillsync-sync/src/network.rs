//! Network monitor abstraction.
//!
//! The platform supplies connectivity; the engine only needs the current
//! state and a way to wait for transitions.

use tokio::sync::watch;

/// Online/offline signal.
pub trait NetworkMonitor: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver that observes every transition. The current value is the
    /// current state.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// A monitor flipped by hand. Used by tests and by hosts that push
/// connectivity changes from platform callbacks.
#[derive(Debug)]
pub struct ManualNetworkMonitor {
    tx: watch::Sender<bool>,
}

impl ManualNetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Set the state. Subscribers are notified only on an actual change.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "network state changed");
        }
    }
}

impl NetworkMonitor for ManualNetworkMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transitions_are_observed() {
        let monitor = ManualNetworkMonitor::offline();
        let mut rx = monitor.subscribe();
        assert!(!monitor.is_online());

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_same_state_does_not_notify() {
        let monitor = ManualNetworkMonitor::online();
        let rx = monitor.subscribe();

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }
}
