//! Download engine clients.
//!
//! Each engine is an external service that executes downloads and pushes
//! progress telemetry over a WebSocket. The engines speak unrelated wire
//! formats; each client normalizes its own format into [`ProgressEvent`]
//! at the edge, so everything downstream sees one event shape.
//!
//! [`ProgressEvent`]: crate::records::ProgressEvent

mod extractor;
mod music_search;
mod processor;

pub use extractor::ExtractorEngineClient;
pub use music_search::MusicSearchEngineClient;
pub use processor::EngineEventProcessor;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::records::ProgressEvent;

/// A download engine seen from the sync core.
///
/// Engines are opaque: the core only consumes their normalized progress
/// stream and can ask them to cancel an in-flight download.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Whether the event connection is currently up.
    fn is_connected(&self) -> bool;

    /// Subscribe to the engine's normalized progress events.
    fn subscribe(&self) -> broadcast::Receiver<ProgressEvent>;

    /// Run one event connection until it closes or errors.
    ///
    /// Callers wrap this in a reconnect loop.
    async fn run_connection(&self) -> Result<()>;

    /// Cancel an in-flight download owned by this engine.
    async fn cancel(&self, id: &str) -> Result<()>;
}
