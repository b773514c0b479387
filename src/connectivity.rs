//! Connectivity monitor
//!
//! Tracks the host's online/offline state and delivers edge-triggered
//! transitions to every listener.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self { state }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Record the current network state. Listeners are only woken on an
    /// actual transition; returns whether one happened.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            log::info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
        changed
    }

    /// Register a listener; the receiver starts with the current state seen
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_edges_are_reported() {
        let monitor = ConnectivityMonitor::new(true);

        assert!(!monitor.set_online(true));
        assert!(monitor.set_online(false));
        assert!(!monitor.set_online(false));
        assert!(!monitor.is_online());
        assert!(monitor.set_online(true));
    }

    #[tokio::test]
    async fn test_listener_sees_transition() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());

        // Repeating the same state does not wake the listener
        monitor.set_online(false);
        assert!(!rx.has_changed().unwrap());
    }
}
