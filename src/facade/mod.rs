//! Application data facade.
//!
//! The only interface the application layer sees: record CRUD over the
//! dual-write path, live in-memory state for the UI, progress application
//! through the reconciler, and sync triggers.
//!
//! State updates follow the storage mode: when the remote store is
//! unavailable the facade updates its in-memory state optimistically right
//! after the local write; when it is available, updates arrive instead
//! from the remote snapshot subscriptions, avoiding a double apply.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::engines::DownloadEngine;
use crate::local_store::{LocalStore, StoreCounts};
use crate::progress::ProgressReconciler;
use crate::records::{
    DownloadRecord, DownloadStatus, ProgressEvent, SearchHistoryEntry, SettingEntry,
};
use crate::remote_store::RemoteStore;
use crate::session::SessionContext;
use crate::sync::{SyncEngine, SyncError, SyncOutcome};

/// Which store currently drives the UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    Cloud,
}

/// In-memory state exposed to the UI layer.
#[derive(Debug, Default, Clone)]
pub struct AppState {
    pub downloads: Vec<DownloadRecord>,
    pub search_history: Vec<SearchHistoryEntry>,
    pub settings: Vec<SettingEntry>,
    /// Reconciled live progress per download id, active transfers only.
    pub active_progress: HashMap<String, ProgressEvent>,
}

/// Daemon status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FacadeStatus {
    pub counts: StoreCounts,
    pub storage_type: StorageType,
    pub is_syncing: bool,
    pub active_downloads: usize,
}

/// The application-facing data surface.
pub struct DataFacade {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    engines: Vec<Arc<dyn DownloadEngine>>,
    session: Arc<SessionContext>,
    sync_engine: Arc<SyncEngine>,
    reconciler: ProgressReconciler,
    settings: SyncSettings,
    state: RwLock<AppState>,
    session_token: CancellationToken,
    subscription_tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl DataFacade {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        engines: Vec<Arc<dyn DownloadEngine>>,
        session: Arc<SessionContext>,
        sync_engine: Arc<SyncEngine>,
        settings: SyncSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            remote,
            engines,
            session,
            sync_engine,
            reconciler: ProgressReconciler::new(),
            settings,
            state: RwLock::new(AppState::default()),
            session_token: CancellationToken::new(),
            subscription_tasks: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Token bounding all session-scoped background work.
    pub fn session_token(&self) -> CancellationToken {
        self.session_token.clone()
    }

    /// Load the local collections into the in-memory state. Call once at
    /// boot before anything reads the state.
    pub async fn load_initial_state(&self) -> Result<()> {
        let downloads = self.local.list_downloads()?;
        let search_history = self.local.list_search_history()?;
        let settings = self.local.get_all_settings()?;

        let mut state = self.state.write().await;
        state.downloads = downloads;
        state.search_history = search_history;
        state.settings = settings;
        info!(
            "Loaded local state: {} downloads, {} search entries, {} settings",
            state.downloads.len(),
            state.search_history.len(),
            state.settings.len()
        );
        Ok(())
    }

    // =========================================================================
    // State access
    // =========================================================================

    pub async fn downloads(&self) -> Vec<DownloadRecord> {
        self.state.read().await.downloads.clone()
    }

    pub async fn search_history(&self) -> Vec<SearchHistoryEntry> {
        self.state.read().await.search_history.clone()
    }

    pub async fn settings(&self) -> Vec<SettingEntry> {
        self.state.read().await.settings.clone()
    }

    pub async fn active_progress(&self) -> HashMap<String, ProgressEvent> {
        self.state.read().await.active_progress.clone()
    }

    pub fn storage_type(&self) -> StorageType {
        if self.sync_engine.remote_available() {
            StorageType::Cloud
        } else {
            StorageType::Local
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_engine.is_syncing()
    }

    pub async fn status(&self) -> Result<FacadeStatus> {
        let counts = self.local.counts()?;
        let active_downloads = self.state.read().await.active_progress.len();
        Ok(FacadeStatus {
            counts,
            storage_type: self.storage_type(),
            is_syncing: self.is_syncing(),
            active_downloads,
        })
    }

    // =========================================================================
    // Downloads
    // =========================================================================

    pub async fn add_download(self: &Arc<Self>, record: DownloadRecord) -> Result<(), SyncError> {
        let local = self.local.clone();
        let local_record = record.clone();
        let remote = self.remote.clone();
        let user_id = self.session.user_id().to_string();
        let remote_record = record.clone();

        self.sync_engine.dual_write(
            move || local.add_download(&local_record),
            async move { remote.add_download(&user_id, &remote_record).await },
        )?;

        if !self.sync_engine.remote_available() {
            let mut state = self.state.write().await;
            state.downloads.retain(|r| r.id != record.id);
            state.downloads.insert(0, record);
        }
        Ok(())
    }

    pub async fn update_download_status(
        self: &Arc<Self>,
        id: &str,
        status: DownloadStatus,
    ) -> Result<(), SyncError> {
        let local = self.local.clone();
        let local_id = id.to_string();
        let remote = self.remote.clone();
        let user_id = self.session.user_id().to_string();
        let remote_id = id.to_string();

        self.sync_engine.dual_write(
            move || local.update_download_status(&local_id, status),
            async move {
                remote
                    .update_download_status(&user_id, &remote_id, status)
                    .await
            },
        )?;

        if !self.sync_engine.remote_available() {
            let mut state = self.state.write().await;
            if let Some(record) = state.downloads.iter_mut().find(|r| r.id == id) {
                record.status = status;
            }
        }
        Ok(())
    }

    pub async fn delete_download(self: &Arc<Self>, id: &str) -> Result<(), SyncError> {
        let local = self.local.clone();
        let local_id = id.to_string();
        let remote = self.remote.clone();
        let user_id = self.session.user_id().to_string();
        let remote_id = id.to_string();

        self.sync_engine.dual_write(
            move || local.delete_download(&local_id),
            async move { remote.delete_download(&user_id, &remote_id).await },
        )?;

        self.reconciler.forget(id);
        let mut state = self.state.write().await;
        state.active_progress.remove(id);
        if !self.sync_engine.remote_available() {
            state.downloads.retain(|r| r.id != id);
        }
        Ok(())
    }

    pub async fn clear_downloads(self: &Arc<Self>) -> Result<(), SyncError> {
        let local = self.local.clone();
        let remote = self.remote.clone();
        let user_id = self.session.user_id().to_string();

        self.sync_engine.dual_write(
            move || local.clear_downloads(),
            async move { remote.clear_downloads(&user_id).await },
        )?;

        self.reconciler.clear();
        let mut state = self.state.write().await;
        state.active_progress.clear();
        if !self.sync_engine.remote_available() {
            state.downloads.clear();
        }
        Ok(())
    }

    /// Ask the owning engine to cancel an in-flight download.
    ///
    /// Ownership is opaque, so each engine is tried in turn; the first one
    /// that accepts wins.
    pub async fn cancel_download(&self, id: &str) -> Result<()> {
        for engine in &self.engines {
            match engine.cancel(id).await {
                Ok(()) => {
                    info!("Cancelled download {} via {} engine", id, engine.name());
                    return Ok(());
                }
                Err(e) => {
                    debug!("{} engine did not cancel {}: {}", engine.name(), id, e);
                }
            }
        }
        bail!("No engine accepted the cancel request for {}", id)
    }

    // =========================================================================
    // Search history
    // =========================================================================

    pub async fn add_search_history(
        self: &Arc<Self>,
        entry: SearchHistoryEntry,
    ) -> Result<(), SyncError> {
        let local = self.local.clone();
        let local_entry = entry.clone();
        let max_entries = self.settings.history_max_entries;
        let remote = self.remote.clone();
        let user_id = self.session.user_id().to_string();
        let remote_entry = entry.clone();

        self.sync_engine.dual_write(
            move || local.add_search_history(&local_entry, max_entries),
            async move { remote.add_search_history(&user_id, &remote_entry).await },
        )?;

        if !self.sync_engine.remote_available() {
            let mut state = self.state.write().await;
            state.search_history.retain(|e| e.id != entry.id);
            state.search_history.insert(0, entry);
            state.search_history.truncate(max_entries);
        }
        Ok(())
    }

    pub async fn delete_search_history(self: &Arc<Self>, id: &str) -> Result<(), SyncError> {
        let local = self.local.clone();
        let local_id = id.to_string();
        let remote = self.remote.clone();
        let user_id = self.session.user_id().to_string();
        let remote_id = id.to_string();

        self.sync_engine.dual_write(
            move || local.delete_search_history(&local_id),
            async move { remote.delete_search_history(&user_id, &remote_id).await },
        )?;

        if !self.sync_engine.remote_available() {
            let mut state = self.state.write().await;
            state.search_history.retain(|e| e.id != id);
        }
        Ok(())
    }

    pub async fn clear_search_history(self: &Arc<Self>) -> Result<(), SyncError> {
        let local = self.local.clone();
        let remote = self.remote.clone();
        let user_id = self.session.user_id().to_string();

        self.sync_engine.dual_write(
            move || local.clear_search_history(),
            async move { remote.clear_search_history(&user_id).await },
        )?;

        if !self.sync_engine.remote_available() {
            self.state.write().await.search_history.clear();
        }
        Ok(())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub async fn save_setting(self: &Arc<Self>, entry: SettingEntry) -> Result<(), SyncError> {
        let local = self.local.clone();
        let local_entry = entry.clone();
        let remote = self.remote.clone();
        let user_id = self.session.user_id().to_string();
        let remote_entry = entry.clone();

        self.sync_engine.dual_write(
            move || local.save_setting(&local_entry),
            async move { remote.save_setting(&user_id, &remote_entry).await },
        )?;

        if !self.sync_engine.remote_available() {
            let mut state = self.state.write().await;
            state.settings.retain(|e| e.key != entry.key);
            state.settings.push(entry);
            state.settings.sort_by(|a, b| a.key.cmp(&b.key));
        }
        Ok(())
    }

    pub async fn delete_setting(self: &Arc<Self>, key: &str) -> Result<(), SyncError> {
        let local = self.local.clone();
        let local_key = key.to_string();
        let remote = self.remote.clone();
        let user_id = self.session.user_id().to_string();
        let remote_key = key.to_string();

        self.sync_engine.dual_write(
            move || local.delete_setting(&local_key),
            async move { remote.delete_setting(&user_id, &remote_key).await },
        )?;

        if !self.sync_engine.remote_available() {
            let mut state = self.state.write().await;
            state.settings.retain(|e| e.key != key);
        }
        Ok(())
    }

    /// Read a setting from the authoritative local store.
    pub fn setting(&self, key: &str) -> Result<Option<SettingEntry>> {
        self.local.get_setting(key)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Run a full bidirectional sync and apply the merged collections to
    /// the in-memory state.
    pub async fn full_sync(&self) -> Result<SyncOutcome, SyncError> {
        let outcome = self.sync_engine.full_sync().await?;
        if let SyncOutcome::Completed(report) = &outcome {
            let mut state = self.state.write().await;
            state.downloads = report.downloads.clone();
            state.search_history = report.search_history.clone();
            state.settings = report.settings.clone();
        }
        Ok(outcome)
    }

    /// Push the local collections to the remote store (first-time upload).
    pub async fn migrate_local_data(&self) -> Result<(), SyncError> {
        let report = self.sync_engine.migrate_local_data().await?;
        info!("{}", report.summary());
        Ok(())
    }

    /// Trigger the once-per-session boot sync if the remote is ready.
    pub fn spawn_auto_sync(&self) {
        self.sync_engine.spawn_auto_sync();
    }

    // =========================================================================
    // Progress
    // =========================================================================

    /// Apply one incoming engine event.
    ///
    /// The event goes through the reconciler before anything else sees it.
    /// Terminal events persist the final status and schedule a deferred
    /// re-fetch of the authoritative record list.
    pub async fn apply_progress(self: &Arc<Self>, incoming: &ProgressEvent) -> ProgressEvent {
        let event = self.reconciler.reconcile(incoming);

        {
            let mut state = self.state.write().await;
            if event.status.is_terminal() {
                state.active_progress.remove(&event.id);
            } else {
                state
                    .active_progress
                    .insert(event.id.clone(), event.clone());
            }
        }

        if event.status.is_terminal() {
            let status = event.status.as_download_status();
            if let Err(e) = self.update_download_status(&event.id, status).await {
                warn!(
                    "Failed to persist terminal status for download {}: {}",
                    event.id, e
                );
            }
            self.spawn_deferred_refresh();
        }

        event
    }

    /// Re-read the downloads collection from the local store into state.
    pub async fn reload_downloads(&self) -> Result<()> {
        let records = self.local.list_downloads()?;
        self.state.write().await.downloads = records;
        Ok(())
    }

    fn spawn_deferred_refresh(self: &Arc<Self>) {
        let facade = Arc::clone(self);
        let delay = Duration::from_millis(self.settings.progress_refresh_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = facade.reload_downloads().await {
                warn!("Deferred downloads refresh failed: {:#}", e);
            }
        });
    }

    // =========================================================================
    // Live subscriptions
    // =========================================================================

    /// Start consuming the remote snapshot subscriptions.
    ///
    /// Each snapshot replaces the corresponding in-memory collection
    /// wholesale. Bound to the session token; call once when the remote
    /// becomes available.
    pub fn start_subscriptions(self: &Arc<Self>) {
        let user_id = self.session.user_id();

        let downloads_rx = self.remote.subscribe_downloads(user_id);
        self.spawn_snapshot_consumer("downloads", downloads_rx, |state, snapshot| {
            state.downloads = snapshot;
        });

        let history_rx = self.remote.subscribe_search_history(user_id);
        self.spawn_snapshot_consumer("search_history", history_rx, |state, snapshot| {
            state.search_history = snapshot;
        });

        let settings_rx = self.remote.subscribe_settings(user_id);
        self.spawn_snapshot_consumer("settings", settings_rx, |state, snapshot| {
            state.settings = snapshot;
        });

        info!("Remote snapshot subscriptions started for user {}", user_id);
    }

    fn spawn_snapshot_consumer<T, F>(
        self: &Arc<Self>,
        kind: &'static str,
        mut rx: broadcast::Receiver<Vec<T>>,
        apply: F,
    ) where
        T: Clone + Send + 'static,
        F: Fn(&mut AppState, Vec<T>) + Send + Sync + 'static,
    {
        let facade = Arc::clone(self);
        let token = self.session_token.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rx.recv() => match result {
                        Ok(snapshot) => {
                            debug!("Applying {} snapshot ({} records)", kind, snapshot.len());
                            apply(&mut *facade.state.write().await, snapshot);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("{} snapshot consumer lagged by {} messages", kind, n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("{} snapshot channel closed", kind);
                            break;
                        }
                    },
                    _ = token.cancelled() => break,
                }
            }
        });
        self.subscription_tasks.lock().unwrap().push(task);
    }

    /// Tear down the session: stop subscriptions and session-scoped tasks.
    pub async fn logout(&self) {
        self.session_token.cancel();
        let tasks: Vec<_> = {
            let mut guard = self.subscription_tasks.lock().unwrap();
            guard.drain(..).collect()
        };
        for task in tasks {
            let _ = task.await;
        }
        info!("Session torn down for user {}", self.session.user_id());
    }
}
