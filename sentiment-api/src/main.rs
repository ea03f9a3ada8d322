//! Composite Sentiment Index API Server
//!
//! Serves the composite index, its history and user alerts.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sentiment_api::{build_providers, build_router, ApiConfig, AppState};
use sentiment_feeds::{build_notifier, CoinGeckoClient, NotifierConfig, SinkStatus};
use sentiment_services::{
    spawn_sweeper, AlertStorage, CompositeConfig, CompositeScorer, SnapshotStorage,
    DEFAULT_SWEEP_INTERVAL,
};

/// Stored snapshots older than this are pruned at startup
const SNAPSHOT_RETENTION_DAYS: i64 = 90;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,sentiment_api=debug,sentiment_services=debug")
        }))
        .init();

    info!("Starting Composite Sentiment Index API");

    let config = ApiConfig::from_env();
    let composite_config = CompositeConfig::from_env()?;

    // Durable storage (SQLite, one file for snapshots and alerts)
    info!("Initializing storage at: {}", config.db_path.display());
    let snapshots = Arc::new(SnapshotStorage::new(&config.db_path)?);
    let alerts = Arc::new(AlertStorage::new(&config.db_path)?);

    match snapshots.prune_older_than(Utc::now() - Duration::days(SNAPSHOT_RETENTION_DAYS)) {
        Ok(0) => {}
        Ok(pruned) => info!("Pruned {} snapshots past retention", pruned),
        Err(e) => warn!("Failed to prune old snapshots: {}", e),
    }

    // Composite scorer
    let mut builder = CompositeScorer::builder(composite_config).snapshot_storage(Arc::clone(&snapshots));
    for provider in build_providers(&config)? {
        builder = builder.provider(provider);
    }
    let scorer = Arc::new(builder.build()?);
    scorer.warm_start();

    // Notifications (optional - no-op sink when nothing is configured)
    let notifier = build_notifier(&NotifierConfig::from_env());
    if notifier.status() == SinkStatus::Unconfigured {
        info!("No notification channel configured - triggered alerts are logged only");
    } else {
        info!("Alert notifications enabled via {}", notifier.name());
    }

    let prices = Arc::new(CoinGeckoClient::new(config.coingecko_api_key.clone())?);

    let state = AppState::new(
        config.clone(),
        Arc::clone(&scorer),
        snapshots,
        alerts,
        notifier,
        prices,
    );

    // Background tasks; handles abort their tasks when dropped at shutdown
    let _cache_sweeper = spawn_sweeper(scorer.cache(), DEFAULT_SWEEP_INTERVAL, "index-cache");
    let _history_sweeper = spawn_sweeper(&state.history_cache, DEFAULT_SWEEP_INTERVAL, "history-cache");
    let _limiter_sweeper = spawn_sweeper(&state.limiter, DEFAULT_SWEEP_INTERVAL, "rate-limiter");
    let _alert_monitor = state.monitor.spawn(config.alert_check_interval);

    // Compute once so the first request is served from cache
    let warm_scorer = Arc::clone(&scorer);
    tokio::spawn(async move {
        let index = warm_scorer.current().await;
        info!("Initial composite index: {} ({})", index.value, index.level);
    });

    let app = build_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
