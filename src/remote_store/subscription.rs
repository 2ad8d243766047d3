//! Snapshot feed lifecycle.
//!
//! Maintains the per-user WebSocket snapshot feed with automatic
//! reconnection. The returned handle is bound to the authenticated
//! session: closing it (or cancelling the parent token on logout) tears
//! the feed down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::HttpRemoteStore;

/// Handle to a running snapshot feed subscription.
///
/// Dropping the handle does not stop the feed; call [`close`] (or cancel
/// the parent token it was spawned under).
///
/// [`close`]: SubscriptionHandle::close
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Stop the feed and wait for the watcher task to finish.
    pub async fn close(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    /// Stop the feed without waiting.
    pub fn close_now(&self) {
        self.cancel.cancel();
    }
}

/// Spawn the snapshot feed watcher for a user.
///
/// Runs in a loop: connect to the feed, fan snapshots out, and on
/// disconnect wait `reconnect_delay` before trying again. The loop ends
/// when `parent` (the session token) is cancelled or the handle is closed.
pub fn spawn_snapshot_watcher(
    store: Arc<HttpRemoteStore>,
    user_id: String,
    reconnect_delay: Duration,
    parent: &CancellationToken,
) -> SubscriptionHandle {
    let cancel = parent.child_token();
    let shutdown = cancel.clone();

    let task = tokio::spawn(async move {
        info!(
            "Snapshot watcher starting for user {} (reconnect_delay={}s)",
            user_id,
            reconnect_delay.as_secs()
        );

        loop {
            tokio::select! {
                result = store.run_snapshot_feed(&user_id) => {
                    if let Err(e) = result {
                        warn!(
                            "Snapshot feed disconnected: {}, reconnecting in {}s",
                            e,
                            reconnect_delay.as_secs()
                        );
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Snapshot watcher shutting down");
                    break;
                }
            }

            // Wait before reconnecting
            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = shutdown.cancelled() => {
                    info!("Snapshot watcher shutting down during reconnect wait");
                    break;
                }
            }
        }

        info!("Snapshot watcher stopped");
    });

    SubscriptionHandle { cancel, task }
}
