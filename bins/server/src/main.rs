//! File storage API server.
//!
//! Main entry point: loads configuration, connects the metadata store and
//! blob store, starts the reaper schedule and serves HTTP until shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filestore_api::{AppState, create_router};
use filestore_core::files::{Reaper, ReaperScheduler};
use filestore_core::storage::{OpendalStorage, StoragePort};
use filestore_db::{FileRepository, connect};
use filestore_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filestore=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Connect to database
    let db = connect(&config.database).await?;
    info!("Connected to database");

    // A misconfigured blob store stops startup, not the first upload.
    let storage = Arc::new(
        OpendalStorage::from_config(&config.storage)
            .context("Failed to initialize blob storage")?,
    );
    info!(backend = %storage.backend(), "Blob storage configured");

    let repo = Arc::new(FileRepository::new(db));
    let shutdown = CancellationToken::new();

    // Reaper schedule
    let scheduler = if config.reaper.enabled {
        let reaper = Arc::new(Reaper::new(
            Arc::clone(&repo),
            Arc::clone(&storage),
            &config.reaper,
        ));
        Some(ReaperScheduler::new(reaper, &config.reaper, shutdown.clone()).spawn())
    } else {
        warn!("Reaper disabled; orphans and deletions will not be reclaimed");
        None
    };

    // Create router
    let state = AppState::new(repo, storage, &config);
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        handle.await.context("Reaper scheduler panicked")?;
    }
    info!("Server stopped");

    Ok(())
}

/// Resolves on Ctrl-C and cancels background work.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
