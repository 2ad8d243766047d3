//! Music-search engine client.
//!
//! The music-search engine resolves tracks by query before fetching them
//! and reports progress in its own vocabulary (percent/state/rate). Its
//! warm-up phase (searching for a source) maps to the starting phase.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::DownloadEngine;
use crate::records::{ProgressEvent, ProgressStatus};

/// Progress payload as the music-search engine emits it.
#[derive(Debug, Clone, Deserialize)]
struct MusicSearchWireEvent {
    download_id: String,
    percent: Option<f64>,
    rate: Option<String>,
    remaining: Option<String>,
    state: String,
}

impl MusicSearchWireEvent {
    fn normalize(self) -> ProgressEvent {
        let status = match self.state.as_str() {
            "SEARCHING" => ProgressStatus::Starting,
            "QUEUED" => ProgressStatus::Pending,
            "FETCHING" | "TAGGING" => ProgressStatus::Downloading,
            "DONE" => ProgressStatus::Completed,
            "FAILED" | "NO_RESULTS" => ProgressStatus::Failed,
            "CANCELLED" => ProgressStatus::Cancelled,
            other => {
                debug!(
                    "Unknown music-search state '{}', treating as downloading",
                    other
                );
                ProgressStatus::Downloading
            }
        };

        ProgressEvent {
            id: self.download_id,
            progress: self.percent.unwrap_or(0.0),
            speed: self.rate,
            eta: self.remaining,
            status,
        }
    }
}

/// Client for the music-search engine.
pub struct MusicSearchEngineClient {
    http_client: reqwest::Client,
    base_url: String,
    ws_url: String,
    connected: AtomicBool,
    event_tx: broadcast::Sender<ProgressEvent>,
}

impl MusicSearchEngineClient {
    pub fn new(base_url: String, ws_url: String) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            ws_url,
            connected: AtomicBool::new(false),
            event_tx,
        }
    }
}

#[async_trait]
impl DownloadEngine for MusicSearchEngineClient {
    fn name(&self) -> &'static str {
        "music-search"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    async fn run_connection(&self) -> Result<()> {
        info!("Connecting to music-search engine: {}", self.ws_url);

        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| anyhow!("Music-search engine connection failed: {}", e))?;

        self.connected.store(true, Ordering::SeqCst);
        info!("Connected to music-search engine");

        let (mut write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<MusicSearchWireEvent>(&text) {
                        Ok(wire) => {
                            let event = wire.normalize();
                            debug!("Music-search event: {:?}", event);
                            if let Err(e) = self.event_tx.send(event) {
                                warn!("No subscribers for music-search event: {}", e);
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse music-search event: {} - {}", e, text);
                        }
                    }
                }
                Ok(Message::Ping(data)) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        error!("Failed to send pong: {}", e);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Music-search engine closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Music-search engine connection error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        Err(anyhow!("Music-search engine connection closed"))
    }

    async fn cancel(&self, id: &str) -> Result<()> {
        let url = format!("{}/tickets/{}", self.base_url, id);
        self.http_client
            .delete(&url)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = MusicSearchEngineClient::new(
            "http://localhost:9002".to_string(),
            "ws://localhost:9002/progress".to_string(),
        );
        assert!(!client.is_connected());
        assert_eq!(client.name(), "music-search");
    }

    #[test]
    fn test_normalize_states() {
        for (state, expected) in [
            ("SEARCHING", ProgressStatus::Starting),
            ("QUEUED", ProgressStatus::Pending),
            ("FETCHING", ProgressStatus::Downloading),
            ("TAGGING", ProgressStatus::Downloading),
            ("DONE", ProgressStatus::Completed),
            ("FAILED", ProgressStatus::Failed),
            ("NO_RESULTS", ProgressStatus::Failed),
            ("CANCELLED", ProgressStatus::Cancelled),
        ] {
            let wire = MusicSearchWireEvent {
                download_id: "d1".to_string(),
                percent: Some(50.0),
                rate: None,
                remaining: None,
                state: state.to_string(),
            };
            assert_eq!(wire.normalize().status, expected, "state {}", state);
        }
    }

    #[test]
    fn test_normalize_field_mapping() {
        let wire: MusicSearchWireEvent = serde_json::from_str(
            r#"{"download_id":"d2","percent":12.5,"rate":"320kb/s","remaining":"01:10","state":"FETCHING"}"#,
        )
        .unwrap();
        let event = wire.normalize();
        assert_eq!(event.id, "d2");
        assert_eq!(event.progress, 12.5);
        assert_eq!(event.speed.as_deref(), Some("320kb/s"));
        assert_eq!(event.eta.as_deref(), Some("01:10"));
    }

    #[test]
    fn test_normalize_missing_percent_defaults_to_zero() {
        let wire: MusicSearchWireEvent =
            serde_json::from_str(r#"{"download_id":"d1","state":"SEARCHING"}"#).unwrap();
        assert_eq!(wire.normalize().progress, 0.0);
    }
}
