use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::RemoteTaskApi;

/// Reports whether the remote service is reachable and publishes
/// online/offline transitions.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;

    /// A receiver that wakes on every transition. Dropping it unsubscribes.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    /// Records the current state. Subscribers are woken only when it
    /// actually changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("network: online");
            } else {
                warn!("network: offline");
            }
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

/// Feeds a monitor from periodic reachability checks against the API.
pub struct ConnectivityProbe {
    handle: JoinHandle<()>,
}

impl ConnectivityProbe {
    pub fn spawn(
        api: Arc<dyn RemoteTaskApi>,
        monitor: Arc<ConnectivityMonitor>,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = match api.ping().await {
                    Ok(()) => true,
                    // A 4xx still proves the service is reachable.
                    Err(err) => !err.is_transient(),
                };
                debug!(online, "connectivity probe");
                monitor.set_online(online);
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for ConnectivityProbe {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
