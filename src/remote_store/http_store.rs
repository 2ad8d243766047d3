//! HTTP + WebSocket client for the cloud document store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::RemoteStore;
use crate::records::{DownloadRecord, DownloadStatus, SearchHistoryEntry, SettingEntry};

/// One frame of the per-user snapshot feed.
///
/// The feed always carries the full current collection for a kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
enum SnapshotFrame {
    Downloads(Vec<DownloadRecord>),
    SearchHistory(Vec<SearchHistoryEntry>),
    Settings(Vec<SettingEntry>),
}

/// Client for the cloud document store.
///
/// CRUD goes over HTTP with bearer-token auth; the live snapshot feed is a
/// WebSocket connection maintained by [`run_snapshot_feed`].
///
/// [`run_snapshot_feed`]: HttpRemoteStore::run_snapshot_feed
pub struct HttpRemoteStore {
    http_client: reqwest::Client,
    base_url: String,
    ws_url: String,
    auth_token: RwLock<Option<String>>,
    connected: AtomicBool,
    downloads_tx: broadcast::Sender<Vec<DownloadRecord>>,
    history_tx: broadcast::Sender<Vec<SearchHistoryEntry>>,
    settings_tx: broadcast::Sender<Vec<SettingEntry>>,
}

impl HttpRemoteStore {
    /// Create a new HttpRemoteStore.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the store API (e.g., "https://store.example.com")
    /// * `ws_url` - WebSocket URL of the snapshot feed
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: String, ws_url: String, timeout_sec: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let (downloads_tx, _) = broadcast::channel(256);
        let (history_tx, _) = broadcast::channel(256);
        let (settings_tx, _) = broadcast::channel(256);

        Ok(Self {
            http_client,
            base_url,
            ws_url,
            auth_token: RwLock::new(None),
            connected: AtomicBool::new(false),
            downloads_tx,
            history_tx,
            settings_tx,
        })
    }

    /// Load an access credential, making the store available.
    pub fn set_credential(&self, token: String) {
        *self.auth_token.write().unwrap() = Some(token);
    }

    /// Drop the access credential, e.g. on logout.
    pub fn clear_credential(&self) {
        *self.auth_token.write().unwrap() = None;
    }

    /// Whether the snapshot feed is currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn token(&self) -> Result<String> {
        self.auth_token
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("No access credential loaded"))
    }

    /// Check that the store is reachable with the loaded credential.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.token()?)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            anyhow::bail!("Store health check failed with status: {}", response.status())
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.token()?)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, url: String, body: &B) -> Result<()> {
        self.http_client
            .post(&url)
            .bearer_auth(self.token()?)
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn delete(&self, url: String) -> Result<()> {
        self.http_client
            .delete(&url)
            .bearer_auth(self.token()?)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// Run the snapshot feed connection once.
    ///
    /// Connects to the per-user feed and fans incoming snapshots out to the
    /// per-kind broadcast channels until the connection closes or errors.
    /// Callers should wrap this in a reconnect loop.
    pub async fn run_snapshot_feed(&self, user_id: &str) -> Result<()> {
        let url = format!(
            "{}/users/{}/feed?token={}",
            self.ws_url,
            user_id,
            self.token()?
        );
        info!("Connecting to snapshot feed: {}", self.ws_url);

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| anyhow!("Snapshot feed connection failed: {}", e))?;

        self.connected.store(true, Ordering::SeqCst);
        info!("Connected to snapshot feed for user {}", user_id);

        let (mut write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<SnapshotFrame>(&text) {
                    Ok(frame) => self.dispatch_frame(frame),
                    Err(e) => {
                        warn!("Failed to parse snapshot frame: {} - {}", e, text);
                    }
                },
                Ok(Message::Ping(data)) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        error!("Failed to send pong: {}", e);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Snapshot feed closed by server");
                    break;
                }
                Err(e) => {
                    error!("Snapshot feed error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        Err(anyhow!("Snapshot feed connection closed"))
    }

    fn dispatch_frame(&self, frame: SnapshotFrame) {
        match frame {
            SnapshotFrame::Downloads(records) => {
                debug!("Snapshot: {} downloads", records.len());
                if let Err(e) = self.downloads_tx.send(records) {
                    debug!("No subscribers for downloads snapshot: {}", e);
                }
            }
            SnapshotFrame::SearchHistory(entries) => {
                debug!("Snapshot: {} search history entries", entries.len());
                if let Err(e) = self.history_tx.send(entries) {
                    debug!("No subscribers for search history snapshot: {}", e);
                }
            }
            SnapshotFrame::Settings(entries) => {
                debug!("Snapshot: {} settings", entries.len());
                if let Err(e) = self.settings_tx.send(entries) {
                    debug!("No subscribers for settings snapshot: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    fn is_available(&self) -> bool {
        self.auth_token.read().unwrap().is_some()
    }

    // === Downloads ===

    async fn get_downloads(&self, user_id: &str) -> Result<Vec<DownloadRecord>> {
        self.get_json(format!("{}/users/{}/downloads", self.base_url, user_id))
            .await
    }

    async fn add_download(&self, user_id: &str, record: &DownloadRecord) -> Result<()> {
        self.post_json(
            format!("{}/users/{}/downloads", self.base_url, user_id),
            record,
        )
        .await
    }

    async fn update_download_status(
        &self,
        user_id: &str,
        id: &str,
        status: DownloadStatus,
    ) -> Result<()> {
        self.post_json(
            format!(
                "{}/users/{}/downloads/{}/status",
                self.base_url, user_id, id
            ),
            &serde_json::json!({ "status": status }),
        )
        .await
    }

    async fn delete_download(&self, user_id: &str, id: &str) -> Result<()> {
        self.delete(format!(
            "{}/users/{}/downloads/{}",
            self.base_url, user_id, id
        ))
        .await
    }

    async fn clear_downloads(&self, user_id: &str) -> Result<()> {
        self.delete(format!("{}/users/{}/downloads", self.base_url, user_id))
            .await
    }

    // === Search history ===

    async fn get_search_history(&self, user_id: &str) -> Result<Vec<SearchHistoryEntry>> {
        self.get_json(format!("{}/users/{}/search-history", self.base_url, user_id))
            .await
    }

    async fn add_search_history(&self, user_id: &str, entry: &SearchHistoryEntry) -> Result<()> {
        self.post_json(
            format!("{}/users/{}/search-history", self.base_url, user_id),
            entry,
        )
        .await
    }

    async fn delete_search_history(&self, user_id: &str, id: &str) -> Result<()> {
        self.delete(format!(
            "{}/users/{}/search-history/{}",
            self.base_url, user_id, id
        ))
        .await
    }

    async fn clear_search_history(&self, user_id: &str) -> Result<()> {
        self.delete(format!("{}/users/{}/search-history", self.base_url, user_id))
            .await
    }

    // === Settings ===

    async fn get_settings(&self, user_id: &str) -> Result<Vec<SettingEntry>> {
        self.get_json(format!("{}/users/{}/settings", self.base_url, user_id))
            .await
    }

    async fn save_setting(&self, user_id: &str, entry: &SettingEntry) -> Result<()> {
        self.post_json(
            format!("{}/users/{}/settings", self.base_url, user_id),
            entry,
        )
        .await
    }

    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<()> {
        self.delete(format!(
            "{}/users/{}/settings/{}",
            self.base_url, user_id, key
        ))
        .await
    }

    // === Bulk overwrite ===

    async fn migrate(
        &self,
        user_id: &str,
        downloads: &[DownloadRecord],
        search_history: &[SearchHistoryEntry],
        settings: &[SettingEntry],
    ) -> Result<()> {
        self.post_json(
            format!("{}/users/{}/migrate", self.base_url, user_id),
            &serde_json::json!({
                "downloads": downloads,
                "search_history": search_history,
                "settings": settings,
            }),
        )
        .await
    }

    // === Live subscriptions ===

    fn subscribe_downloads(&self, user_id: &str) -> broadcast::Receiver<Vec<DownloadRecord>> {
        debug!("Subscribing to downloads snapshots for user {}", user_id);
        self.downloads_tx.subscribe()
    }

    fn subscribe_search_history(
        &self,
        user_id: &str,
    ) -> broadcast::Receiver<Vec<SearchHistoryEntry>> {
        debug!("Subscribing to search history snapshots for user {}", user_id);
        self.history_tx.subscribe()
    }

    fn subscribe_settings(&self, user_id: &str) -> broadcast::Receiver<Vec<SettingEntry>> {
        debug!("Subscribing to settings snapshots for user {}", user_id);
        self.settings_tx.subscribe()
    }
}
