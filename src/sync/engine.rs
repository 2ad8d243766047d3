//! Sync engine orchestration.
//!
//! Owns the remote-availability gating, the local-first dual-write path
//! and the bidirectional full sync. Local writes are awaited and fatal;
//! remote writes are fire-and-forget and repaired by the next full sync.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::merge::{merge_by_timestamp, merge_last_processed_wins};
use crate::config::SyncSettings;
use crate::local_store::LocalStore;
use crate::records::{DownloadRecord, SearchHistoryEntry, SettingEntry};
use crate::remote_store::RemoteStore;
use crate::session::SessionContext;

/// Failures the sync engine can surface to callers.
///
/// Remote write failures during a dual-write are deliberately absent:
/// they are logged and absorbed, never propagated.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local store rejected a write. Fatal to the calling operation;
    /// no drift between stores is introduced.
    #[error("local store write failed: {0}")]
    LocalWrite(anyhow::Error),

    /// The remote store is not usable for this session.
    #[error("remote store is not available")]
    RemoteUnavailable,

    /// A full sync attempt aborted. No partial merge is presented as
    /// success; the caller may retry.
    #[error("full sync failed: {0}")]
    FullSync(anyhow::Error),
}

/// Result of a completed full sync: the merged collections both stores
/// now converge on.
#[derive(Debug, Clone, PartialEq)]
pub struct FullSyncReport {
    pub downloads: Vec<DownloadRecord>,
    pub search_history: Vec<SearchHistoryEntry>,
    pub settings: Vec<SettingEntry>,
}

impl FullSyncReport {
    pub fn summary(&self) -> String {
        format!(
            "Synced {} downloads, {} search entries, {} settings",
            self.downloads.len(),
            self.search_history.len(),
            self.settings.len()
        )
    }
}

/// Outcome of a full sync trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The sync ran to completion.
    Completed(FullSyncReport),
    /// Another sync was already in flight; this trigger did nothing.
    AlreadyRunning,
}

/// Orchestrates dual-writes and full syncs between the two stores.
pub struct SyncEngine {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    session: Arc<SessionContext>,
    settings: SyncSettings,
    /// Single-flight gate: overlapping full_sync triggers collapse into
    /// one in-flight sync, the losers observe AlreadyRunning.
    sync_gate: Mutex<()>,
    full_sync_running: AtomicBool,
    pending_remote_writes: AtomicUsize,
}

impl SyncEngine {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        session: Arc<SessionContext>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            local,
            remote,
            session,
            settings,
            sync_gate: Mutex::new(()),
            full_sync_running: AtomicBool::new(false),
            pending_remote_writes: AtomicUsize::new(0),
        }
    }

    /// Whether the remote store is usable for this session.
    ///
    /// True only once identity is resolved, the credential probe has run,
    /// and the store reports a loaded credential.
    pub fn remote_available(&self) -> bool {
        self.session.is_ready() && self.remote.is_available()
    }

    /// Whether any sync activity is currently in flight (full sync or
    /// background remote writes). UI feedback only.
    pub fn is_syncing(&self) -> bool {
        self.full_sync_running.load(Ordering::SeqCst)
            || self.pending_remote_writes.load(Ordering::SeqCst) > 0
    }

    /// Apply a mutation to both stores, local-first.
    ///
    /// The local operation is awaited synchronously and its failure is
    /// fatal to the caller. If the remote is available the remote
    /// operation is spawned fire-and-forget; its failure is logged and
    /// left for the next full sync to repair.
    pub fn dual_write<L, Fut>(self: &Arc<Self>, local_op: L, remote_op: Fut) -> Result<(), SyncError>
    where
        L: FnOnce() -> anyhow::Result<()>,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        local_op().map_err(SyncError::LocalWrite)?;

        if self.remote_available() {
            self.pending_remote_writes.fetch_add(1, Ordering::SeqCst);
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = remote_op.await {
                    warn!("Remote write failed, local store stays authoritative: {:#}", e);
                }
                engine.pending_remote_writes.fetch_sub(1, Ordering::SeqCst);
            });
        }

        Ok(())
    }

    /// Run a full bidirectional sync over the three record kinds.
    ///
    /// Reads both stores entirely, merges deterministically, then
    /// overwrites the remote (bulk migrate) and the local store
    /// (clear-and-reinsert) with the merged collections. Any failing step
    /// aborts the attempt. Calling this twice with no intervening
    /// mutations yields identical collections both times.
    pub async fn full_sync(&self) -> Result<SyncOutcome, SyncError> {
        if !self.remote_available() {
            return Err(SyncError::RemoteUnavailable);
        }

        let Ok(_guard) = self.sync_gate.try_lock() else {
            debug!("Full sync trigger ignored, another sync is in flight");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        self.full_sync_running.store(true, Ordering::SeqCst);
        let result = self.run_full_sync().await;
        self.full_sync_running.store(false, Ordering::SeqCst);

        match result {
            Ok(report) => {
                info!("{}", report.summary());
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => Err(SyncError::FullSync(e)),
        }
    }

    async fn run_full_sync(&self) -> anyhow::Result<FullSyncReport> {
        let user_id = self.session.user_id();

        let local_downloads = self.local.list_downloads()?;
        let remote_downloads = self.remote.get_downloads(user_id).await?;
        let mut downloads = merge_by_timestamp(
            local_downloads,
            remote_downloads,
            |record| record.id.clone(),
            |record| record.timestamp,
        );
        downloads.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        let local_history = self.local.list_search_history()?;
        let remote_history = self.remote.get_search_history(user_id).await?;
        let mut search_history = merge_by_timestamp(
            local_history,
            remote_history,
            |entry| entry.id.clone(),
            |entry| entry.timestamp,
        );
        search_history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        search_history.truncate(self.settings.history_max_entries);

        let local_settings = self.local.get_all_settings()?;
        let remote_settings = self.remote.get_settings(user_id).await?;
        let mut settings =
            merge_last_processed_wins(local_settings, remote_settings, |entry| entry.key.clone());
        settings.sort_by(|a, b| a.key.cmp(&b.key));

        // Converge both stores on the merged collections
        self.remote
            .migrate(user_id, &downloads, &search_history, &settings)
            .await?;
        self.local.replace_downloads(&downloads)?;
        self.local.replace_search_history(&search_history)?;
        self.local.replace_settings(&settings)?;

        Ok(FullSyncReport {
            downloads,
            search_history,
            settings,
        })
    }

    /// Trigger the once-per-session boot sync.
    ///
    /// When the remote is available and the session has not auto-synced
    /// yet, waits a short settle delay and runs one full sync in the
    /// background. Repeated calls in the same session do nothing.
    pub fn spawn_auto_sync(self: &Arc<Self>) {
        if !self.remote_available() {
            return;
        }
        if !self.session.try_claim_auto_sync() {
            return;
        }

        let engine = Arc::clone(self);
        let settle_delay = Duration::from_secs(self.settings.settle_delay_secs);
        tokio::spawn(async move {
            tokio::time::sleep(settle_delay).await;
            match engine.full_sync().await {
                Ok(SyncOutcome::Completed(report)) => {
                    info!("Boot sync done: {}", report.summary());
                }
                Ok(SyncOutcome::AlreadyRunning) => {
                    debug!("Boot sync skipped, a sync was already running");
                }
                Err(e) => {
                    warn!("Boot sync failed: {:#}", e);
                }
            }
        });
    }

    /// Push the full local collections to the remote store without
    /// merging back. First-time upload path.
    pub async fn migrate_local_data(&self) -> Result<FullSyncReport, SyncError> {
        if !self.remote_available() {
            return Err(SyncError::RemoteUnavailable);
        }

        let downloads = self.local.list_downloads().map_err(SyncError::LocalWrite)?;
        let search_history = self
            .local
            .list_search_history()
            .map_err(SyncError::LocalWrite)?;
        let settings = self
            .local
            .get_all_settings()
            .map_err(SyncError::LocalWrite)?;

        self.remote
            .migrate(
                self.session.user_id(),
                &downloads,
                &search_history,
                &settings,
            )
            .await
            .map_err(SyncError::FullSync)?;

        let report = FullSyncReport {
            downloads,
            search_history,
            settings,
        };
        info!("Uploaded local data: {}", report.summary());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_store::SqliteLocalStore;
    use crate::records::DownloadStatus;
    use crate::remote_store::MemoryRemoteStore;

    fn record(id: &str, timestamp: i64, status: DownloadStatus) -> DownloadRecord {
        DownloadRecord {
            id: id.to_string(),
            title: format!("title-{}", id),
            url: "https://example.com".to_string(),
            format: "mp4".to_string(),
            path: format!("/media/{}.mp4", id),
            timestamp,
            status,
            platform: "youtube".to_string(),
            thumbnail: None,
            size_bytes: None,
        }
    }

    struct Fixture {
        local: Arc<SqliteLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        session: Arc<SessionContext>,
        engine: Arc<SyncEngine>,
    }

    fn fixture() -> Fixture {
        let local = Arc::new(SqliteLocalStore::in_memory().unwrap());
        let remote = Arc::new(MemoryRemoteStore::new());
        let session = Arc::new(SessionContext::new("u1".to_string()));
        let engine = Arc::new(SyncEngine::new(
            local.clone(),
            remote.clone(),
            session.clone(),
            SyncSettings {
                settle_delay_secs: 0,
                ..SyncSettings::default()
            },
        ));
        Fixture {
            local,
            remote,
            session,
            engine,
        }
    }

    fn make_remote_ready(fx: &Fixture) {
        fx.session.mark_auth_resolved();
        fx.session.mark_credential_probed();
        fx.remote.set_available(true);
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_remote_not_available_until_session_ready() {
        let fx = fixture();
        fx.remote.set_available(true);
        assert!(!fx.engine.remote_available());

        fx.session.mark_auth_resolved();
        fx.session.mark_credential_probed();
        assert!(fx.engine.remote_available());
    }

    #[tokio::test]
    async fn test_dual_write_local_failure_is_fatal() {
        let fx = fixture();
        make_remote_ready(&fx);

        let result = fx.engine.dual_write(
            || anyhow::bail!("disk full"),
            async { Ok(()) },
        );
        assert!(matches!(result, Err(SyncError::LocalWrite(_))));
    }

    #[tokio::test]
    async fn test_dual_write_skips_remote_when_unavailable() {
        let fx = fixture();
        // Session never becomes ready
        let rec = record("1", 100, DownloadStatus::Pending);
        let remote = fx.remote.clone();
        let local = fx.local.clone();
        fx.engine
            .dual_write(
                || local.add_download(&rec),
                {
                    let remote = remote.clone();
                    let rec = rec.clone();
                    async move { remote.add_download("u1", &rec).await }
                },
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.local.list_downloads().unwrap().len(), 1);
        assert!(fx.remote.get_downloads("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dual_write_applies_to_both_stores_when_available() {
        let fx = fixture();
        make_remote_ready(&fx);

        let rec = record("1", 100, DownloadStatus::Pending);
        let remote = fx.remote.clone();
        let local = fx.local.clone();
        fx.engine
            .dual_write(
                || local.add_download(&rec),
                {
                    let remote = remote.clone();
                    let rec = rec.clone();
                    async move { remote.add_download("u1", &rec).await }
                },
            )
            .unwrap();

        let remote = fx.remote.clone();
        wait_until(move || {
            futures::executor::block_on(remote.get_downloads("u1"))
                .map(|records| records.len() == 1)
                .unwrap_or(false)
        })
        .await;
        assert_eq!(fx.local.list_downloads().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dual_write_remote_failure_is_absorbed() {
        let fx = fixture();
        make_remote_ready(&fx);
        fx.remote.set_fail_writes(true);

        let rec = record("1", 100, DownloadStatus::Pending);
        let local = fx.local.clone();
        let remote = fx.remote.clone();
        let result = fx.engine.dual_write(
            || local.add_download(&rec),
            {
                let rec = rec.clone();
                async move { remote.add_download("u1", &rec).await }
            },
        );

        // Local succeeded, remote failure only logged
        assert!(result.is_ok());
        let engine = fx.engine.clone();
        wait_until(move || !engine.is_syncing()).await;
        assert_eq!(fx.local.list_downloads().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_full_sync_requires_remote() {
        let fx = fixture();
        let result = fx.engine.full_sync().await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable)));
    }

    #[tokio::test]
    async fn test_full_sync_remote_timestamp_wins() {
        let fx = fixture();
        make_remote_ready(&fx);

        fx.local
            .add_download(&record("1", 100, DownloadStatus::Downloading))
            .unwrap();
        fx.remote
            .add_download("u1", &record("1", 200, DownloadStatus::Completed))
            .await
            .unwrap();

        let outcome = fx.engine.full_sync().await.unwrap();
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected completed sync");
        };

        assert_eq!(report.downloads.len(), 1);
        assert_eq!(report.downloads[0].status, DownloadStatus::Completed);

        // Both stores converged on the winner
        let local_records = fx.local.list_downloads().unwrap();
        assert_eq!(local_records[0].status, DownloadStatus::Completed);
        let remote_records = fx.remote.get_downloads("u1").await.unwrap();
        assert_eq!(remote_records[0].status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn test_full_sync_settings_converge_and_stay_stable() {
        let fx = fixture();
        make_remote_ready(&fx);

        fx.local
            .save_setting(&SettingEntry::new("download_path", "/a"))
            .unwrap();
        fx.remote
            .save_setting("u1", &SettingEntry::new("download_path", "/b"))
            .await
            .unwrap();

        let SyncOutcome::Completed(first) = fx.engine.full_sync().await.unwrap() else {
            panic!("expected completed sync");
        };
        assert_eq!(first.settings, vec![SettingEntry::new("download_path", "/b")]);

        // Both stores report the same single value
        assert_eq!(
            fx.local.get_setting("download_path").unwrap().unwrap().value,
            "/b"
        );
        assert_eq!(fx.remote.get_settings("u1").await.unwrap().len(), 1);

        // A further sync changes nothing
        let SyncOutcome::Completed(second) = fx.engine.full_sync().await.unwrap() else {
            panic!("expected completed sync");
        };
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_full_sync_is_idempotent() {
        let fx = fixture();
        make_remote_ready(&fx);

        fx.local
            .add_download(&record("1", 100, DownloadStatus::Downloading))
            .unwrap();
        fx.local
            .add_download(&record("2", 300, DownloadStatus::Completed))
            .unwrap();
        fx.remote
            .add_download("u1", &record("1", 200, DownloadStatus::Completed))
            .await
            .unwrap();
        fx.remote
            .add_download("u1", &record("3", 50, DownloadStatus::Failed))
            .await
            .unwrap();

        let SyncOutcome::Completed(first) = fx.engine.full_sync().await.unwrap() else {
            panic!("expected completed sync");
        };
        let SyncOutcome::Completed(second) = fx.engine.full_sync().await.unwrap() else {
            panic!("expected completed sync");
        };
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_overlapping_full_sync_collapses() {
        let fx = fixture();
        make_remote_ready(&fx);
        fx.remote.set_read_delay_ms(300);

        let engine = fx.engine.clone();
        let first = tokio::spawn(async move { engine.full_sync().await });

        let engine = fx.engine.clone();
        wait_until(move || engine.is_syncing()).await;

        let second = fx.engine.full_sync().await.unwrap();
        assert_eq!(second, SyncOutcome::AlreadyRunning);

        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, SyncOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_auto_sync_runs_once_per_session() {
        let fx = fixture();
        make_remote_ready(&fx);
        fx.local
            .add_download(&record("1", 100, DownloadStatus::Pending))
            .unwrap();

        fx.engine.spawn_auto_sync();
        fx.engine.spawn_auto_sync();

        let remote = fx.remote.clone();
        wait_until(move || {
            futures::executor::block_on(remote.get_downloads("u1"))
                .map(|records| records.len() == 1)
                .unwrap_or(false)
        })
        .await;
        // The second trigger found the session flag already claimed
        assert!(!fx.session.try_claim_auto_sync());
    }

    #[tokio::test]
    async fn test_migrate_local_data_pushes_without_merging_back() {
        let fx = fixture();
        make_remote_ready(&fx);

        fx.local
            .add_download(&record("1", 100, DownloadStatus::Pending))
            .unwrap();
        fx.remote
            .add_download("u1", &record("2", 200, DownloadStatus::Completed))
            .await
            .unwrap();

        let report = fx.engine.migrate_local_data().await.unwrap();
        assert_eq!(report.downloads.len(), 1);

        // Remote now holds exactly the local collection
        let remote_records = fx.remote.get_downloads("u1").await.unwrap();
        assert_eq!(remote_records.len(), 1);
        assert_eq!(remote_records[0].id, "1");

        // Local kept its own copy untouched
        assert_eq!(fx.local.list_downloads().unwrap().len(), 1);
    }
}
