//! Background processor for engine progress streams.
//!
//! Maintains the event connection to each configured engine and drains
//! their normalized progress events through the facade (and thus the
//! reconciler). Handles reconnection on disconnects.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::DownloadEngine;
use crate::facade::DataFacade;

/// Drives all configured download engines.
///
/// Per engine, two tasks run until shutdown:
/// 1. a connection maintainer: connect, and on disconnect wait and reconnect
/// 2. an event drain: apply every received event through the facade
pub struct EngineEventProcessor {
    facade: Arc<DataFacade>,
    engines: Vec<Arc<dyn DownloadEngine>>,
    reconnect_delay: Duration,
}

impl EngineEventProcessor {
    pub fn new(
        facade: Arc<DataFacade>,
        engines: Vec<Arc<dyn DownloadEngine>>,
        reconnect_delay_secs: u64,
    ) -> Self {
        Self {
            facade,
            engines,
            reconnect_delay: Duration::from_secs(reconnect_delay_secs),
        }
    }

    /// Main processing loop - call from a spawned task.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Engine processor starting ({} engines, reconnect_delay={}s)",
            self.engines.len(),
            self.reconnect_delay.as_secs()
        );

        let mut tasks = Vec::new();
        for engine in &self.engines {
            tasks.push(tokio::spawn(Self::maintain_connection(
                engine.clone(),
                self.reconnect_delay,
                shutdown.clone(),
            )));
            tasks.push(tokio::spawn(Self::drain_events(
                engine.clone(),
                self.facade.clone(),
                shutdown.clone(),
            )));
        }

        shutdown.cancelled().await;
        for task in tasks {
            let _ = task.await;
        }

        info!("Engine processor stopped");
    }

    /// Keep one engine's event connection alive until shutdown.
    async fn maintain_connection(
        engine: Arc<dyn DownloadEngine>,
        reconnect_delay: Duration,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                result = engine.run_connection() => {
                    if let Err(e) = result {
                        warn!(
                            "{} engine disconnected: {}, reconnecting in {}s",
                            engine.name(),
                            e,
                            reconnect_delay.as_secs()
                        );
                    }
                }
                _ = shutdown.cancelled() => break,
            }

            // Wait before reconnecting
            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        debug!("{} engine connection maintainer stopped", engine.name());
    }

    /// Apply every event from one engine through the facade.
    async fn drain_events(
        engine: Arc<dyn DownloadEngine>,
        facade: Arc<DataFacade>,
        shutdown: CancellationToken,
    ) {
        let mut rx = engine.subscribe();
        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(event) => {
                        facade.apply_progress(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("{} event receiver lagged by {} messages", engine.name(), n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("{} event channel closed", engine.name());
                        break;
                    }
                },
                _ = shutdown.cancelled() => break,
            }
        }

        debug!("{} engine event drain stopped", engine.name());
    }
}
