use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mediastash::config::{AppConfig, CliConfig, FileConfig};
use mediastash::engines::{
    DownloadEngine, EngineEventProcessor, ExtractorEngineClient, MusicSearchEngineClient,
};
use mediastash::remote_store::spawn_snapshot_watcher;
use mediastash::{
    DataFacade, HttpRemoteStore, MemoryRemoteStore, RemoteStore, SessionContext, SqliteLocalStore,
    SyncEngine,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite local store database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// User id owning the remote collections.
    #[clap(long)]
    pub user_id: Option<String>,

    /// Path to a TOML config file. TOML values override CLI values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the file holding the remote-access token.
    #[clap(long, value_parser = parse_path)]
    pub credential_path: Option<PathBuf>,

    /// Base URL of the cloud document store.
    #[clap(long)]
    pub remote_url: Option<String>,

    /// WebSocket URL of the cloud snapshot feed.
    #[clap(long)]
    pub remote_ws_url: Option<String>,

    /// Timeout in seconds for cloud store requests.
    #[clap(long, default_value_t = 30)]
    pub remote_timeout_sec: u64,

    /// Interval in minutes between status log lines. Set to 0 to disable.
    #[clap(long, default_value_t = 5)]
    pub status_interval_minutes: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!(
        "mediastash {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        user_id: cli_args.user_id.clone(),
        credential_path: cli_args.credential_path.clone(),
        remote_url: cli_args.remote_url.clone(),
        remote_ws_url: cli_args.remote_ws_url.clone(),
        remote_timeout_sec: cli_args.remote_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening local store at {:?}...", config.db_path);
    let local = Arc::new(SqliteLocalStore::new(&config.db_path)?);

    // Identity comes from config in this headless build, so it is resolved
    // as soon as the session exists.
    let session = Arc::new(SessionContext::new(config.user_id.clone()));
    session.mark_auth_resolved();

    // Build the remote store and probe the credential.
    let mut http_remote: Option<Arc<HttpRemoteStore>> = None;
    let remote: Arc<dyn RemoteStore> = match (&config.remote_url, &config.remote_ws_url) {
        (Some(url), Some(ws_url)) => {
            let store = Arc::new(HttpRemoteStore::new(
                url.clone(),
                ws_url.clone(),
                config.remote_timeout_sec,
            )?);

            match load_credential(config.credential_path.as_deref()) {
                Some(token) => {
                    store.set_credential(token);
                    match store.health_check().await {
                        Ok(()) => info!("Cloud store reachable at {}", url),
                        Err(e) => warn!(
                            "Cloud store probe failed, continuing local-first: {:#}",
                            e
                        ),
                    }
                }
                None => info!("No remote credential found, running local-only"),
            }

            http_remote = Some(store.clone());
            store
        }
        _ => {
            info!("No cloud store configured, running local-only");
            Arc::new(MemoryRemoteStore::new())
        }
    };
    session.mark_credential_probed();

    // Build engine clients from config.
    let mut engines: Vec<Arc<dyn DownloadEngine>> = Vec::new();
    if let (Some(url), Some(ws_url)) = (
        &config.engines.extractor_url,
        &config.engines.extractor_ws_url,
    ) {
        info!("Extractor engine configured at {}", url);
        engines.push(Arc::new(ExtractorEngineClient::new(
            url.clone(),
            ws_url.clone(),
        )));
    }
    if let (Some(url), Some(ws_url)) = (
        &config.engines.music_search_url,
        &config.engines.music_search_ws_url,
    ) {
        info!("Music-search engine configured at {}", url);
        engines.push(Arc::new(MusicSearchEngineClient::new(
            url.clone(),
            ws_url.clone(),
        )));
    }

    let sync_engine = Arc::new(SyncEngine::new(
        local.clone(),
        remote.clone(),
        session.clone(),
        config.sync.clone(),
    ));
    let facade = DataFacade::new(
        local,
        remote,
        engines.clone(),
        session.clone(),
        sync_engine,
        config.sync.clone(),
    );
    facade.load_initial_state().await?;

    let session_token = facade.session_token();

    // Live subscriptions and snapshot feed, once the remote is usable.
    let mut watcher_handle = None;
    if let Some(store) = &http_remote {
        if store.is_available() {
            facade.start_subscriptions();
            watcher_handle = Some(spawn_snapshot_watcher(
                store.clone(),
                config.user_id.clone(),
                Duration::from_secs(config.sync.feed_reconnect_delay_secs),
                &session_token,
            ));
        }
    }

    // Engine progress streams.
    let processor = EngineEventProcessor::new(
        facade.clone(),
        engines,
        config.engines.reconnect_delay_secs,
    );
    let processor_token = session_token.clone();
    let processor_task = tokio::spawn(async move { processor.run(processor_token).await });

    // One full sync per session once everything has settled.
    facade.spawn_auto_sync();

    // Periodic status line.
    if cli_args.status_interval_minutes > 0 {
        let status_facade = facade.clone();
        let status_token = session_token.clone();
        let interval = Duration::from_secs(cli_args.status_interval_minutes * 60);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match status_facade.status().await {
                            Ok(status) => info!(
                                "Status: {} downloads ({} active), {} search entries, {} settings, storage={:?}, syncing={}",
                                status.counts.downloads,
                                status.active_downloads,
                                status.counts.search_history,
                                status.counts.settings,
                                status.storage_type,
                                status.is_syncing,
                            ),
                            Err(e) => error!("Failed to read status: {:#}", e),
                        }
                    }
                    _ = status_token.cancelled() => break,
                }
            }
        });
    }

    info!("Ready (user {})", config.user_id);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down...");
    facade.logout().await;
    if let Some(handle) = watcher_handle {
        handle.close().await;
    }
    let _ = processor_task.await;

    Ok(())
}

/// Read the remote-access token from disk, if present.
fn load_credential(path: Option<&std::path::Path>) -> Option<String> {
    let path = path?;
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let token = content.trim().to_string();
            if token.is_empty() {
                warn!("Credential file {:?} is empty", path);
                None
            } else {
                Some(token)
            }
        }
        Err(e) => {
            info!("No credential loaded from {:?}: {}", path, e);
            None
        }
    }
}
