//! Per-user cloud document store.
//!
//! The remote store mirrors the local collections into a per-user cloud
//! document store. It is best-effort: dual-writes to it are fire-and-forget
//! and a failed write is repaired by the next full sync. Each record kind
//! has a push subscription delivering full collection snapshots.

mod http_store;
mod memory_store;
mod subscription;

pub use http_store::HttpRemoteStore;
pub use memory_store::MemoryRemoteStore;
pub use subscription::{spawn_snapshot_watcher, SubscriptionHandle};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::records::{DownloadRecord, DownloadStatus, SearchHistoryEntry, SettingEntry};

/// Trait for the per-user cloud document store.
///
/// All operations are scoped to a user id. Subscriptions deliver the full
/// current collection for a kind, not deltas.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether a usable access credential is currently loaded.
    ///
    /// When false the engine must behave as local-only; no remote
    /// operation is attempted.
    fn is_available(&self) -> bool;

    // === Downloads ===

    async fn get_downloads(&self, user_id: &str) -> Result<Vec<DownloadRecord>>;
    async fn add_download(&self, user_id: &str, record: &DownloadRecord) -> Result<()>;
    async fn update_download_status(
        &self,
        user_id: &str,
        id: &str,
        status: DownloadStatus,
    ) -> Result<()>;
    async fn delete_download(&self, user_id: &str, id: &str) -> Result<()>;
    async fn clear_downloads(&self, user_id: &str) -> Result<()>;

    // === Search history ===

    async fn get_search_history(&self, user_id: &str) -> Result<Vec<SearchHistoryEntry>>;
    async fn add_search_history(&self, user_id: &str, entry: &SearchHistoryEntry) -> Result<()>;
    async fn delete_search_history(&self, user_id: &str, id: &str) -> Result<()>;
    async fn clear_search_history(&self, user_id: &str) -> Result<()>;

    // === Settings ===

    async fn get_settings(&self, user_id: &str) -> Result<Vec<SettingEntry>>;
    async fn save_setting(&self, user_id: &str, entry: &SettingEntry) -> Result<()>;
    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<()>;

    // === Bulk overwrite ===

    /// Overwrite all three remote collections with the given ones.
    ///
    /// Used by full sync convergence and by the first-time upload path.
    async fn migrate(
        &self,
        user_id: &str,
        downloads: &[DownloadRecord],
        search_history: &[SearchHistoryEntry],
        settings: &[SettingEntry],
    ) -> Result<()>;

    // === Live subscriptions ===

    /// Subscribe to full downloads snapshots for the user.
    fn subscribe_downloads(&self, user_id: &str) -> broadcast::Receiver<Vec<DownloadRecord>>;

    /// Subscribe to full search history snapshots for the user.
    fn subscribe_search_history(
        &self,
        user_id: &str,
    ) -> broadcast::Receiver<Vec<SearchHistoryEntry>>;

    /// Subscribe to full settings snapshots for the user.
    fn subscribe_settings(&self, user_id: &str) -> broadcast::Receiver<Vec<SettingEntry>>;
}
