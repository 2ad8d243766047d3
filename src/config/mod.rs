mod file_config;

pub use file_config::{EnginesConfig, FileConfig, SyncConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub user_id: Option<String>,
    pub credential_path: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub remote_ws_url: Option<String>,
    pub remote_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_path: PathBuf,
    pub user_id: String,
    pub credential_path: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub remote_ws_url: Option<String>,
    pub remote_timeout_sec: u64,

    // Feature configs (with defaults)
    pub sync: SyncSettings,
    pub engines: EngineSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let user_id = file
            .user_id
            .or_else(|| cli.user_id.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("user_id must be specified via --user-id or in config file")
            })?;

        let credential_path = file
            .credential_path
            .map(PathBuf::from)
            .or_else(|| cli.credential_path.clone());

        let remote_url = file.remote_url.or_else(|| cli.remote_url.clone());
        let remote_ws_url = file.remote_ws_url.or_else(|| cli.remote_ws_url.clone());

        if remote_url.is_some() != remote_ws_url.is_some() {
            bail!("remote_url and remote_ws_url must be provided together");
        }

        let remote_timeout_sec = file.remote_timeout_sec.unwrap_or(cli.remote_timeout_sec);

        // Sync settings - merge file config with defaults
        let sync_file = file.sync.unwrap_or_default();
        let sync = SyncSettings {
            settle_delay_secs: sync_file.settle_delay_secs.unwrap_or(2),
            history_max_entries: sync_file.history_max_entries.unwrap_or(50),
            progress_refresh_delay_ms: sync_file.progress_refresh_delay_ms.unwrap_or(500),
            feed_reconnect_delay_secs: sync_file.feed_reconnect_delay_secs.unwrap_or(5),
        };

        let engines_file = file.engines.unwrap_or_default();
        let engines = EngineSettings {
            extractor_url: engines_file.extractor_url,
            extractor_ws_url: engines_file.extractor_ws_url,
            music_search_url: engines_file.music_search_url,
            music_search_ws_url: engines_file.music_search_ws_url,
            reconnect_delay_secs: engines_file.reconnect_delay_secs.unwrap_or(5),
        };

        Ok(Self {
            db_path,
            user_id,
            credential_path,
            remote_url,
            remote_ws_url,
            remote_timeout_sec,
            sync,
            engines,
        })
    }

    /// True when a cloud store is configured for this install.
    pub fn remote_configured(&self) -> bool {
        self.remote_url.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Delay between remote readiness and the boot auto-sync.
    pub settle_delay_secs: u64,
    /// Cap on the search history collection, most recent first.
    pub history_max_entries: usize,
    /// Delay before the authoritative re-fetch after a terminal progress event.
    pub progress_refresh_delay_ms: u64,
    /// Delay between snapshot feed reconnection attempts.
    pub feed_reconnect_delay_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            settle_delay_secs: 2,
            history_max_entries: 50,
            progress_refresh_delay_ms: 500,
            feed_reconnect_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub extractor_url: Option<String>,
    pub extractor_ws_url: Option<String>,
    pub music_search_url: Option<String>,
    pub music_search_ws_url: Option<String>,
    pub reconnect_delay_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_with_db(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_path: Some(dir.path().join("mediastash.db")),
            user_id: Some("u1".to_string()),
            remote_timeout_sec: 30,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().join("mediastash.db")),
            user_id: Some("u1".to_string()),
            credential_path: Some(PathBuf::from("/creds/token")),
            remote_url: Some("https://store.example.com".to_string()),
            remote_ws_url: Some("wss://store.example.com/ws".to_string()),
            remote_timeout_sec: 60,
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, temp_dir.path().join("mediastash.db"));
        assert_eq!(config.user_id, "u1");
        assert_eq!(config.credential_path, Some(PathBuf::from("/creds/token")));
        assert_eq!(
            config.remote_url,
            Some("https://store.example.com".to_string())
        );
        assert_eq!(config.remote_timeout_sec, 60);
        assert!(config.remote_configured());
        // Defaults
        assert_eq!(config.sync.settle_delay_secs, 2);
        assert_eq!(config.sync.history_max_entries, 50);
        assert_eq!(config.engines.reconnect_delay_secs, 5);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = cli_with_db(&temp_dir);

        let file_config = FileConfig {
            user_id: Some("from-toml".to_string()),
            remote_timeout_sec: Some(120),
            sync: Some(SyncConfig {
                history_max_entries: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.user_id, "from-toml");
        assert_eq!(config.remote_timeout_sec, 120);
        assert_eq!(config.sync.history_max_entries, 10);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.db_path, temp_dir.path().join("mediastash.db"));
        assert_eq!(config.sync.settle_delay_secs, 2);
    }

    #[test]
    fn test_resolve_missing_db_path_error() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_path must be specified"));
    }

    #[test]
    fn test_resolve_missing_user_id_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().join("mediastash.db")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("user_id must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_error() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/nonexistent/path/mediastash.db")),
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_remote_urls_must_come_together() {
        let temp_dir = TempDir::new().unwrap();
        let mut cli = cli_with_db(&temp_dir);
        cli.remote_url = Some("https://store.example.com".to_string());

        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must be provided together"));
    }

    #[test]
    fn test_remote_not_configured_without_url() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli_with_db(&temp_dir), None).unwrap();
        assert!(!config.remote_configured());
    }

    #[test]
    fn test_file_config_parses_toml() {
        let toml_str = r#"
            user_id = "u1"

            [sync]
            settle_delay_secs = 7

            [engines]
            extractor_ws_url = "ws://localhost:9001/events"
        "#;
        let file: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(file.user_id.as_deref(), Some("u1"));
        assert_eq!(file.sync.unwrap().settle_delay_secs, Some(7));
        assert_eq!(
            file.engines.unwrap().extractor_ws_url.as_deref(),
            Some("ws://localhost:9001/events")
        );
    }
}
