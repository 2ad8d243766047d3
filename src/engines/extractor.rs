//! Generic extractor engine client.
//!
//! The extractor engine handles arbitrary media URLs and reports progress
//! as percentage/speed/eta tuples with its own phase vocabulary.

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

/// Progress payload as the extractor engine emits it.
#[derive(Debug, Clone, Deserialize)]
struct ExtractorWireEvent {
    id: String,
    progress: Option<f64>,
    speed: Option<String>,
    eta: Option<String>,
    status: String,
}

impl ExtractorWireEvent {
    /// Translate into the shared event shape.
    ///
    /// Unknown phases are treated as still-downloading rather than dropped,
    /// so a vocabulary drift in the engine cannot stall the UI.
    fn normalize(self) -> ProgressEvent {
        let status = match self.status.as_str() {
            "starting" => ProgressStatus::Starting,
            "queued" => ProgressStatus::Pending,
            "downloading" | "processing" => ProgressStatus::Downloading,
            "finished" => ProgressStatus::Completed,
            "error" => ProgressStatus::Failed,
            "cancelled" => ProgressStatus::Cancelled,
            other => {
                debug!("Unknown extractor phase '{}', treating as downloading", other);
                ProgressStatus::Downloading
            }
        };

        ProgressEvent {
            id: self.id,
            progress: self.progress.unwrap_or(0.0),
            speed: self.speed,
            eta: self.eta,
            status,
        }
    }
}

/// Client for the generic extractor engine.
pub struct ExtractorEngineClient {
    http_client: reqwest::Client,
    base_url: String,
    ws_url: String,
    connected: AtomicBool,
    event_tx: broadcast::Sender<ProgressEvent>,
}

impl ExtractorEngineClient {
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
impl DownloadEngine for ExtractorEngineClient {
    fn name(&self) -> &'static str {
        "extractor"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    async fn run_connection(&self) -> Result<()> {
        info!("Connecting to extractor engine: {}", self.ws_url);

        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| anyhow!("Extractor engine connection failed: {}", e))?;

        self.connected.store(true, Ordering::SeqCst);
        info!("Connected to extractor engine");

        let (mut write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ExtractorWireEvent>(&text) {
                        Ok(wire) => {
                            let event = wire.normalize();
                            debug!("Extractor event: {:?}", event);
                            if let Err(e) = self.event_tx.send(event) {
                                warn!("No subscribers for extractor event: {}", e);
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse extractor event: {} - {}", e, text);
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
                    info!("Extractor engine closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Extractor engine connection error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        Err(anyhow!("Extractor engine connection closed"))
    }

    async fn cancel(&self, id: &str) -> Result<()> {
        let url = format!("{}/downloads/{}/cancel", self.base_url, id);
        self.http_client
            .post(&url)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
