use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use jellynouncer::api::{ApiServer, AppState};
use jellynouncer::config::AppConfig;
use jellynouncer::database::{self, ItemStore, MaintenanceScheduler, SqlxItemStore};
use jellynouncer::ingest::{DeletionCorrelator, EventProcessor, KeyedLocks, LibrarySync};
use jellynouncer::jellyfin::JellyfinClient;
use jellynouncer::logging;
use jellynouncer::notification::{
    DiscordEmbedTemplate, DiscordTransport, NotificationQueue, SlidingWindowLimiter,
};
use jellynouncer::utils::http_client::{build_client, install_rustls_provider};

/// Timeout for Discord requests when the config does not set one.
const DEFAULT_DISCORD_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_rustls_provider();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let (logging_config, _log_guard) =
        logging::init_logging(&config.logging.dir).context("Failed to initialize logging")?;
    info!("Starting jellynouncer v{}", env!("CARGO_PKG_VERSION"));

    // Database
    database::ensure_database_dir(&config.database.url)
        .context("Failed to create database directory")?;
    let pool =
        database::init_pool_with_size(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to open database")?;
    database::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    let sqlx_store = SqlxItemStore::new(pool.clone());
    let store: Arc<dyn ItemStore> = Arc::new(sqlx_store.clone());

    // Upstream and delivery collaborators
    let jellyfin_settings = config.jellyfin.settings();
    let jellyfin = Arc::new(JellyfinClient::new(
        build_client(jellyfin_settings.timeout)?,
        &jellyfin_settings,
    ));
    if !jellyfin.test_connection().await {
        warn!("Jellyfin is not reachable; item lookups will fail until it is");
    }

    let discord_timeout = config
        .discord
        .request_timeout_seconds
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_DISCORD_TIMEOUT);
    let discord = Arc::new(DiscordTransport::new(
        build_client(discord_timeout)?,
        config.discord.webhook_urls(),
    ));
    let template = Arc::new(DiscordEmbedTemplate::new(
        config.discord.username.clone(),
        config.discord.avatar_url.clone(),
    ));

    let shutdown = CancellationToken::new();

    // Pipeline
    let queue = NotificationQueue::new(
        config.discord.queue_config(),
        SlidingWindowLimiter::new(config.rate_limit.limiter_config()),
        discord.clone(),
        template,
        store.clone(),
    );
    let (correlator, confirmed_rx) =
        DeletionCorrelator::new(config.notifications.deletion_delay());
    let locks = KeyedLocks::new();
    let processor = Arc::new(EventProcessor::new(
        store.clone(),
        jellyfin.clone(),
        correlator.clone(),
        queue.clone(),
        config.discord.router(),
        locks.clone(),
        config.notifications.processor_config(),
    ));
    // Stopped only after the correlator, so no confirmed deletion is lost.
    let consumer_cancel = CancellationToken::new();
    let consumer = tokio::spawn(
        processor
            .clone()
            .run_confirmed_deletions(confirmed_rx, consumer_cancel.clone()),
    );

    // Background jobs
    let maintenance = Arc::new(MaintenanceScheduler::new(
        sqlx_store,
        config.maintenance.maintenance_config(),
        shutdown.child_token(),
    ));
    let maintenance_handle = maintenance.clone().start();
    let log_cleanup = logging_config.start_retention_cleanup(shutdown.child_token());

    let library_sync = Arc::new(LibrarySync::new(store.clone(), jellyfin.clone(), locks));
    let sync_handle = match config.sync.interval() {
        Some(interval) if config.sync.on_startup => {
            Some(library_sync.clone().start_periodic(interval, shutdown.child_token()))
        }
        Some(interval) => {
            let sync = library_sync.clone();
            let cancel = shutdown.child_token();
            Some(tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = sync.start_periodic(interval, cancel).await {
                            warn!("Library sync task ended abnormally: {}", e);
                        }
                    }
                }
            }))
        }
        None => None,
    };

    // HTTP
    let state = AppState::new(processor.clone(), store, library_sync)
        .with_jellyfin(jellyfin)
        .with_discord(discord)
        .with_logging_config(logging_config);
    let tasks = state.tasks.clone();
    let server = ApiServer::new(config.server.clone(), state, shutdown.child_token());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    if let Err(e) = server.run().await {
        error!("API server error: {}", e);
        shutdown.cancel();
    }

    // Shutdown: stop intake, then drain the pipeline back to front.
    shutdown.cancel();
    maintenance.stop();
    tasks.close();
    tasks.wait().await;
    correlator.shutdown().await;
    consumer_cancel.cancel();
    if let Err(e) = consumer.await {
        warn!("Deletion consumer ended abnormally: {}", e);
    }
    queue.shutdown().await;

    for handle in [Some(maintenance_handle), Some(log_cleanup), sync_handle]
        .into_iter()
        .flatten()
    {
        let _ = handle.await;
    }
    pool.close().await;

    info!("jellynouncer stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
