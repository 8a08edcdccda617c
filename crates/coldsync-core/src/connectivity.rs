//! Connectivity signals.
//!
//! The environment (OS network events, a reachability probe, a UI toggle)
//! reports online/offline through [`ConnectivityMonitor::set_online`];
//! interested components subscribe to transitions. Signals are advisory and
//! may lag real reachability.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Current reachability of the backend as last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub const fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }

    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Shared online/offline flag with change notification
#[derive(Clone)]
pub struct ConnectivityMonitor {
    sender: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn current(&self) -> Connectivity {
        *self.sender.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Report the latest signal; returns whether it changed the state
    pub fn set_online(&self, online: bool) -> bool {
        let next = Connectivity::from_online(online);
        let changed = self.sender.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::info!("Connectivity changed: {next:?}");
        }
        changed
    }

    /// Receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}

/// Poll `check` every `interval` and feed the result into `monitor`
pub fn spawn_probe<F, Fut>(monitor: ConnectivityMonitor, interval: Duration, check: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = check().await;
            monitor.set_online(online);
        }
    })
}
