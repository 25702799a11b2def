mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anidl_core::{
    config::LogFormat, load_config, validate_config, AniListClient, AutoDownloader, Config,
    DownloaderSettings, JobScheduler, MetadataProvider, NyaaSearcher, QBittorrentClient,
    SanitizedConfig, Searcher, SqliteTrackingPersistence, TorrentClient, TrackingPersistence,
    TrackingStore,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the config file path
const CONFIG_ENV: &str = "ANIDL_CONFIG";

/// How long shutdown waits for queued jobs before saving anyway
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,anidl_core=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Logging is configured by the config file, so failures loading it are
    // reported with the default format.
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Pretty);
            return Err(e).with_context(|| format!("Failed to load config from {:?}", config_path));
        }
    };
    init_tracing(config.log_format);

    validate_config(&config).context("Configuration validation failed")?;

    info!(version = VERSION, "Starting anidl");
    info!("Configuration loaded from {:?}", config_path);
    debug!(config = ?SanitizedConfig::from(&config), "Effective configuration");

    // Restore tracking state
    let persistence = SqliteTrackingPersistence::new(&config.database.path)
        .with_context(|| format!("Failed to open database {:?}", config.database.path))?;
    let snapshot = persistence
        .load()
        .context("Failed to load tracking state")?;
    info!(
        items = snapshot.items.len(),
        users = snapshot.users.len(),
        "Tracking state restored"
    );
    let store = Arc::new(TrackingStore::from_snapshot(snapshot));

    for username in &config.anilist.users {
        if store.add_user(username).await {
            info!(user = %username, "Tracking configured user");
        }
    }

    let downloader = create_downloader(&config, Arc::clone(&store))?;

    let interval_secs = config.downloader.update_interval_secs.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "Update loop started");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                if !downloader.update_all().await {
                    continue;
                }
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = downloader.scheduler().wait_idle() => {
                        info!("Update cycle complete");
                        checkpoint(&downloader, &persistence, &config).await;
                    }
                }
            }
        }
    }

    info!("Shutting down...");
    if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, downloader.scheduler().wait_idle())
        .await
        .is_err()
    {
        warn!(
            pending = downloader.scheduler().pending_jobs(),
            "Queues did not drain in time, saving current state"
        );
    }
    checkpoint(&downloader, &persistence, &config).await;
    info!("Shutdown complete");

    Ok(())
}

/// Wire the service clients into an auto-downloader.
fn create_downloader(config: &Config, store: Arc<TrackingStore>) -> Result<AutoDownloader> {
    info!("Initializing AniList client at {}", config.anilist.url);
    let metadata: Arc<dyn MetadataProvider> = Arc::new(
        AniListClient::new(&config.anilist).context("Failed to create AniList client")?,
    );

    info!("Initializing Nyaa searcher at {}", config.nyaa.url);
    let searcher: Arc<dyn Searcher> = Arc::new(
        NyaaSearcher::new(config.nyaa.clone()).context("Failed to create Nyaa searcher")?,
    );

    info!("Initializing qBittorrent client at {}", config.qbittorrent.url);
    let torrent_client: Arc<dyn TorrentClient> = Arc::new(
        QBittorrentClient::new(config.qbittorrent.clone())
            .context("Failed to create qBittorrent client")?,
    );

    let scheduler = JobScheduler::new(Duration::from_millis(config.scheduler.delay_ms));

    Ok(AutoDownloader::new(
        DownloaderSettings::from(config),
        store,
        metadata,
        searcher,
        torrent_client,
        scheduler,
    ))
}

/// Save the tracking state and export metrics. Failures are logged.
async fn checkpoint(
    downloader: &AutoDownloader,
    persistence: &dyn TrackingPersistence,
    config: &Config,
) {
    let snapshot = downloader.store().snapshot().await;
    match persistence.save(&snapshot) {
        Ok(()) => debug!(items = snapshot.items.len(), "Tracking state saved"),
        Err(e) => error!(error = %e, "Failed to save tracking state"),
    }

    if let Some(path) = &config.metrics.textfile_path {
        metrics::collect_dynamic_metrics(downloader).await;
        export_metrics(path);
    }
}

fn export_metrics(path: &Path) {
    match metrics::write_textfile(path) {
        Ok(()) => debug!("Metrics written to {:?}", path),
        Err(e) => warn!("Failed to write metrics: {:#}", e),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
