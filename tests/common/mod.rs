//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};

use mediastash::config::SyncSettings;
use mediastash::facade::DataFacade;
use mediastash::local_store::{LocalStore, StoreCounts};
use mediastash::records::{
    DownloadRecord, DownloadStatus, ProgressEvent, ProgressStatus, SearchHistoryEntry,
    SettingEntry,
};
use mediastash::remote_store::MemoryRemoteStore;
use mediastash::session::SessionContext;
use mediastash::sync::SyncEngine;

pub const TEST_USER: &str = "u1";

/// Local store kept in memory, with a failure toggle for exercising the
/// fatal local-write path.
pub struct MemoryLocalStore {
    fail_writes: AtomicBool,
    downloads: Mutex<Vec<DownloadRecord>>,
    history: Mutex<Vec<SearchHistoryEntry>>,
    settings: Mutex<Vec<SettingEntry>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self {
            fail_writes: AtomicBool::new(false),
            downloads: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            settings: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("Simulated local write failure");
        }
        Ok(())
    }

    fn sort_downloads(records: &mut Vec<DownloadRecord>) {
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    }

    fn sort_history(entries: &mut Vec<SearchHistoryEntry>) {
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    }
}

impl LocalStore for MemoryLocalStore {
    fn list_downloads(&self) -> Result<Vec<DownloadRecord>> {
        let mut records = self.downloads.lock().unwrap().clone();
        Self::sort_downloads(&mut records);
        Ok(records)
    }

    fn get_download(&self, id: &str) -> Result<Option<DownloadRecord>> {
        Ok(self
            .downloads
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    fn add_download(&self, record: &DownloadRecord) -> Result<()> {
        self.check_writable()?;
        self.downloads.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn update_download_status(&self, id: &str, status: DownloadStatus) -> Result<()> {
        self.check_writable()?;
        let mut records = self.downloads.lock().unwrap();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => bail!("Download not found: {}", id),
        }
    }

    fn delete_download(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        self.downloads.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    fn clear_downloads(&self) -> Result<()> {
        self.check_writable()?;
        self.downloads.lock().unwrap().clear();
        Ok(())
    }

    fn replace_downloads(&self, records: &[DownloadRecord]) -> Result<()> {
        self.check_writable()?;
        *self.downloads.lock().unwrap() = records.to_vec();
        Ok(())
    }

    fn list_search_history(&self) -> Result<Vec<SearchHistoryEntry>> {
        let mut entries = self.history.lock().unwrap().clone();
        Self::sort_history(&mut entries);
        Ok(entries)
    }

    fn add_search_history(&self, entry: &SearchHistoryEntry, max_entries: usize) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.history.lock().unwrap();
        entries.push(entry.clone());
        Self::sort_history(&mut entries);
        entries.truncate(max_entries);
        Ok(())
    }

    fn delete_search_history(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        self.history.lock().unwrap().retain(|e| e.id != id);
        Ok(())
    }

    fn clear_search_history(&self) -> Result<()> {
        self.check_writable()?;
        self.history.lock().unwrap().clear();
        Ok(())
    }

    fn replace_search_history(&self, entries: &[SearchHistoryEntry]) -> Result<()> {
        self.check_writable()?;
        *self.history.lock().unwrap() = entries.to_vec();
        Ok(())
    }

    fn get_setting(&self, key: &str) -> Result<Option<SettingEntry>> {
        Ok(self
            .settings
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.key == key)
            .cloned())
    }

    fn get_all_settings(&self) -> Result<Vec<SettingEntry>> {
        let mut entries = self.settings.lock().unwrap().clone();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn save_setting(&self, entry: &SettingEntry) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.settings.lock().unwrap();
        entries.retain(|e| e.key != entry.key);
        entries.push(entry.clone());
        Ok(())
    }

    fn delete_setting(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.settings.lock().unwrap().retain(|e| e.key != key);
        Ok(())
    }

    fn replace_settings(&self, entries: &[SettingEntry]) -> Result<()> {
        self.check_writable()?;
        *self.settings.lock().unwrap() = entries.to_vec();
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            downloads: self.downloads.lock().unwrap().len(),
            search_history: self.history.lock().unwrap().len(),
            settings: self.settings.lock().unwrap().len(),
        })
    }
}

/// Everything a test needs to drive the facade.
pub struct TestApp {
    pub local: Arc<MemoryLocalStore>,
    pub remote: Arc<MemoryRemoteStore>,
    pub session: Arc<SessionContext>,
    pub sync_engine: Arc<SyncEngine>,
    pub facade: Arc<DataFacade>,
}

impl TestApp {
    pub fn new() -> Self {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let session = Arc::new(SessionContext::new(TEST_USER.to_string()));
        let settings = SyncSettings {
            settle_delay_secs: 0,
            progress_refresh_delay_ms: 10,
            ..SyncSettings::default()
        };
        let sync_engine = Arc::new(SyncEngine::new(
            local.clone(),
            remote.clone(),
            session.clone(),
            settings.clone(),
        ));
        let facade = DataFacade::new(
            local.clone(),
            remote.clone(),
            Vec::new(),
            session.clone(),
            sync_engine.clone(),
            settings,
        );
        Self {
            local,
            remote,
            session,
            sync_engine,
            facade,
        }
    }

    /// Make the remote store usable: resolve identity, mark the credential
    /// probe done, load a credential.
    pub fn go_online(&self) {
        self.session.mark_auth_resolved();
        self.session.mark_credential_probed();
        self.remote.set_available(true);
    }
}

pub fn download(id: &str, timestamp: i64, status: DownloadStatus) -> DownloadRecord {
    DownloadRecord {
        id: id.to_string(),
        title: format!("title-{}", id),
        url: format!("https://example.com/v/{}", id),
        format: "mp4".to_string(),
        path: format!("/media/{}.mp4", id),
        timestamp,
        status,
        platform: "youtube".to_string(),
        thumbnail: None,
        size_bytes: None,
    }
}

pub fn history_entry(id: &str, timestamp: i64) -> SearchHistoryEntry {
    SearchHistoryEntry {
        id: id.to_string(),
        query: format!("query-{}", id),
        timestamp,
        title: None,
        thumbnail: None,
    }
}

pub fn progress(id: &str, value: f64, status: ProgressStatus) -> ProgressEvent {
    ProgressEvent {
        id: id.to_string(),
        progress: value,
        speed: None,
        eta: None,
        status,
    }
}

/// Poll until the condition holds, or panic after ~5s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
