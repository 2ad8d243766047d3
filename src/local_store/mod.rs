//! Local persisted store for downloads, search history and settings.
//!
//! The local store is the authoritative side of every dual-write: callers
//! await it synchronously and treat its failure as fatal. Each call
//! completes fully or fails atomically.

mod schema;
mod sqlite_store;

pub use sqlite_store::SqliteLocalStore;

use anyhow::Result;

use crate::records::{DownloadRecord, DownloadStatus, SearchHistoryEntry, SettingEntry};

/// Per-kind record counts, used for the daemon status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreCounts {
    pub downloads: usize,
    pub search_history: usize,
    pub settings: usize,
}

/// Trait for the local persisted store.
///
/// Calls are synchronous and assumed to complete fully or fail atomically.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait LocalStore: Send + Sync {
    // === Downloads ===

    /// List all download records, newest first.
    fn list_downloads(&self) -> Result<Vec<DownloadRecord>>;

    /// Get a download record by id.
    fn get_download(&self, id: &str) -> Result<Option<DownloadRecord>>;

    /// Insert a new download record.
    fn add_download(&self, record: &DownloadRecord) -> Result<()>;

    /// Update the status of an existing download.
    fn update_download_status(&self, id: &str, status: DownloadStatus) -> Result<()>;

    /// Delete a download record by id.
    fn delete_download(&self, id: &str) -> Result<()>;

    /// Delete all download records.
    fn clear_downloads(&self) -> Result<()>;

    /// Replace the whole downloads collection (clear and re-insert) in one
    /// transaction. Used by full sync convergence.
    fn replace_downloads(&self, records: &[DownloadRecord]) -> Result<()>;

    // === Search history ===

    /// List search history entries, newest first.
    fn list_search_history(&self) -> Result<Vec<SearchHistoryEntry>>;

    /// Insert a search history entry, trimming the oldest entries so at
    /// most `max_entries` remain.
    fn add_search_history(&self, entry: &SearchHistoryEntry, max_entries: usize) -> Result<()>;

    /// Delete a search history entry by id.
    fn delete_search_history(&self, id: &str) -> Result<()>;

    /// Delete all search history entries.
    fn clear_search_history(&self) -> Result<()>;

    /// Replace the whole search history collection in one transaction.
    fn replace_search_history(&self, entries: &[SearchHistoryEntry]) -> Result<()>;

    // === Settings ===

    /// Get a setting by key.
    fn get_setting(&self, key: &str) -> Result<Option<SettingEntry>>;

    /// Get all settings.
    fn get_all_settings(&self) -> Result<Vec<SettingEntry>>;

    /// Insert or overwrite a setting.
    fn save_setting(&self, entry: &SettingEntry) -> Result<()>;

    /// Delete a setting by key.
    fn delete_setting(&self, key: &str) -> Result<()>;

    /// Replace the whole settings collection in one transaction.
    fn replace_settings(&self, entries: &[SettingEntry]) -> Result<()>;

    // === Status ===

    /// Per-kind record counts.
    fn counts(&self) -> Result<StoreCounts>;
}
