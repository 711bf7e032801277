use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connectivity::Connectivity;
use crate::coordinator::SyncCoordinator;

/// Keeps an auto-sync subscription alive. Dropping it unsubscribes.
#[must_use = "auto-sync stops when the handle is dropped"]
pub struct AutoSyncHandle {
    handle: JoinHandle<()>,
}

impl AutoSyncHandle {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for AutoSyncHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Replays the queue once right away, then again on every transition to
/// online.
pub fn spawn_auto_sync(
    coordinator: Arc<SyncCoordinator>,
    connectivity: Arc<dyn Connectivity>,
) -> AutoSyncHandle {
    let mut transitions = connectivity.subscribe();
    let handle = tokio::spawn(async move {
        let report = coordinator.sync_pending_changes().await;
        debug!(?report, "startup drain attempt");

        while transitions.changed().await.is_ok() {
            let online = *transitions.borrow_and_update();
            if !online {
                continue;
            }
            info!("connection restored; replaying pending changes");
            let report = coordinator.sync_pending_changes().await;
            debug!(?report, "reconnect drain attempt");
        }
        debug!("connectivity source closed; auto-sync stopped");
    });

    AutoSyncHandle { handle }
}
