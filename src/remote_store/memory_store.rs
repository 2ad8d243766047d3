//! In-memory remote store implementation.
//!
//! Backs local-only runs (no cloud store configured) and tests. Holds the
//! per-user collections in memory and pushes a full snapshot on every
//! mutation, mimicking the cloud feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;

use super::RemoteStore;
use crate::records::{DownloadRecord, DownloadStatus, SearchHistoryEntry, SettingEntry};

#[derive(Default)]
struct Collections {
    downloads: Vec<DownloadRecord>,
    search_history: Vec<SearchHistoryEntry>,
    settings: Vec<SettingEntry>,
}

/// Remote store kept entirely in memory.
///
/// Unavailable by default; `set_available(true)` stands in for a loaded
/// credential.
pub struct MemoryRemoteStore {
    available: AtomicBool,
    fail_writes: AtomicBool,
    read_delay_ms: std::sync::atomic::AtomicU64,
    data: Mutex<HashMap<String, Collections>>,
    downloads_tx: broadcast::Sender<Vec<DownloadRecord>>,
    history_tx: broadcast::Sender<Vec<SearchHistoryEntry>>,
    settings_tx: broadcast::Sender<Vec<SettingEntry>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        let (downloads_tx, _) = broadcast::channel(256);
        let (history_tx, _) = broadcast::channel(256);
        let (settings_tx, _) = broadcast::channel(256);
        Self {
            available: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            read_delay_ms: std::sync::atomic::AtomicU64::new(0),
            data: Mutex::new(HashMap::new()),
            downloads_tx,
            history_tx,
            settings_tx,
        }
    }

    /// Toggle credential availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every write fail, to exercise the fire-and-forget error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay reads, to exercise overlapping-sync behavior.
    pub fn set_read_delay_ms(&self, delay_ms: u64) {
        self.read_delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    async fn apply_read_delay(&self) {
        let delay_ms = self.read_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("Simulated remote write failure");
        }
        Ok(())
    }

    fn with_user<R>(&self, user_id: &str, f: impl FnOnce(&mut Collections) -> R) -> R {
        let mut data = self.data.lock().unwrap();
        f(data.entry(user_id.to_string()).or_default())
    }

    fn push_downloads_snapshot(&self, user_id: &str) {
        let snapshot = self.with_user(user_id, |c| c.downloads.clone());
        let _ = self.downloads_tx.send(snapshot);
    }

    fn push_history_snapshot(&self, user_id: &str) {
        let snapshot = self.with_user(user_id, |c| c.search_history.clone());
        let _ = self.history_tx.send(snapshot);
    }

    fn push_settings_snapshot(&self, user_id: &str) {
        let snapshot = self.with_user(user_id, |c| c.settings.clone());
        let _ = self.settings_tx.send(snapshot);
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    // === Downloads ===

    async fn get_downloads(&self, user_id: &str) -> Result<Vec<DownloadRecord>> {
        self.apply_read_delay().await;
        Ok(self.with_user(user_id, |c| c.downloads.clone()))
    }

    async fn add_download(&self, user_id: &str, record: &DownloadRecord) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| {
            c.downloads.retain(|r| r.id != record.id);
            c.downloads.push(record.clone());
        });
        self.push_downloads_snapshot(user_id);
        Ok(())
    }

    async fn update_download_status(
        &self,
        user_id: &str,
        id: &str,
        status: DownloadStatus,
    ) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| {
            if let Some(record) = c.downloads.iter_mut().find(|r| r.id == id) {
                record.status = status;
            }
        });
        self.push_downloads_snapshot(user_id);
        Ok(())
    }

    async fn delete_download(&self, user_id: &str, id: &str) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| c.downloads.retain(|r| r.id != id));
        self.push_downloads_snapshot(user_id);
        Ok(())
    }

    async fn clear_downloads(&self, user_id: &str) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| c.downloads.clear());
        self.push_downloads_snapshot(user_id);
        Ok(())
    }

    // === Search history ===

    async fn get_search_history(&self, user_id: &str) -> Result<Vec<SearchHistoryEntry>> {
        Ok(self.with_user(user_id, |c| c.search_history.clone()))
    }

    async fn add_search_history(&self, user_id: &str, entry: &SearchHistoryEntry) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| {
            c.search_history.retain(|e| e.id != entry.id);
            c.search_history.push(entry.clone());
        });
        self.push_history_snapshot(user_id);
        Ok(())
    }

    async fn delete_search_history(&self, user_id: &str, id: &str) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| c.search_history.retain(|e| e.id != id));
        self.push_history_snapshot(user_id);
        Ok(())
    }

    async fn clear_search_history(&self, user_id: &str) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| c.search_history.clear());
        self.push_history_snapshot(user_id);
        Ok(())
    }

    // === Settings ===

    async fn get_settings(&self, user_id: &str) -> Result<Vec<SettingEntry>> {
        Ok(self.with_user(user_id, |c| c.settings.clone()))
    }

    async fn save_setting(&self, user_id: &str, entry: &SettingEntry) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| {
            c.settings.retain(|e| e.key != entry.key);
            c.settings.push(entry.clone());
        });
        self.push_settings_snapshot(user_id);
        Ok(())
    }

    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| c.settings.retain(|e| e.key != key));
        self.push_settings_snapshot(user_id);
        Ok(())
    }

    // === Bulk overwrite ===

    async fn migrate(
        &self,
        user_id: &str,
        downloads: &[DownloadRecord],
        search_history: &[SearchHistoryEntry],
        settings: &[SettingEntry],
    ) -> Result<()> {
        self.check_writable()?;
        self.with_user(user_id, |c| {
            c.downloads = downloads.to_vec();
            c.search_history = search_history.to_vec();
            c.settings = settings.to_vec();
        });
        self.push_downloads_snapshot(user_id);
        self.push_history_snapshot(user_id);
        self.push_settings_snapshot(user_id);
        Ok(())
    }

    // === Live subscriptions ===

    fn subscribe_downloads(&self, _user_id: &str) -> broadcast::Receiver<Vec<DownloadRecord>> {
        self.downloads_tx.subscribe()
    }

    fn subscribe_search_history(
        &self,
        _user_id: &str,
    ) -> broadcast::Receiver<Vec<SearchHistoryEntry>> {
        self.history_tx.subscribe()
    }

    fn subscribe_settings(&self, _user_id: &str) -> broadcast::Receiver<Vec<SettingEntry>> {
        self.settings_tx.subscribe()
    }
}
