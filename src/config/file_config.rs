use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub user_id: Option<String>,
    pub credential_path: Option<String>,
    pub remote_url: Option<String>,
    pub remote_ws_url: Option<String>,
    pub remote_timeout_sec: Option<u64>,

    // Feature configs
    pub sync: Option<SyncConfig>,
    pub engines: Option<EnginesConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub settle_delay_secs: Option<u64>,
    pub history_max_entries: Option<usize>,
    pub progress_refresh_delay_ms: Option<u64>,
    pub feed_reconnect_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EnginesConfig {
    pub extractor_url: Option<String>,
    pub extractor_ws_url: Option<String>,
    pub music_search_url: Option<String>,
    pub music_search_ws_url: Option<String>,
    pub reconnect_delay_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
