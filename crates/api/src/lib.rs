//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes over the file lifecycle services
//! - Tenant context extraction
//! - JSON error responses

pub mod error;
pub mod middleware;
pub mod routes;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use filestore_core::files::{
    FileRepository, OwnershipRegistry, Reaper, UploadIngestor, UsageQuota,
};
use filestore_core::storage::OpendalStorage;
use filestore_shared::AppConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
///
/// Generic over the metadata store so the same router serves Postgres in
/// production and the in-memory store in tests.
pub struct AppState<R: FileRepository> {
    /// Upload pipeline.
    pub ingestor: Arc<UploadIngestor<R, OpendalStorage, UsageQuota<R>>>,
    /// Attach, detach, delete and read.
    pub registry: Arc<OwnershipRegistry<R, OpendalStorage>>,
    /// Manual reclamation.
    pub reaper: Arc<Reaper<R, OpendalStorage>>,
}

impl<R: FileRepository> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            ingestor: Arc::clone(&self.ingestor),
            registry: Arc::clone(&self.registry),
            reaper: Arc::clone(&self.reaper),
        }
    }
}

impl<R: FileRepository> AppState<R> {
    /// Wire the lifecycle services over one repository and one blob store.
    #[must_use]
    pub fn new(repo: Arc<R>, storage: Arc<OpendalStorage>, config: &AppConfig) -> Self {
        let quota = Arc::new(UsageQuota::new(Arc::clone(&repo), config.quota.clone()));
        let ingestor = UploadIngestor::new(
            Arc::clone(&repo),
            Arc::clone(&storage),
            quota,
            config.upload.clone(),
        );
        let registry = OwnershipRegistry::new(
            Arc::clone(&repo),
            Arc::clone(&storage),
            Duration::from_secs(config.storage.redirect_ttl_secs),
        );
        let reaper = Reaper::new(repo, storage, &config.reaper);

        Self {
            ingestor: Arc::new(ingestor),
            registry: Arc::new(registry),
            reaper: Arc::new(reaper),
        }
    }
}

/// Creates the main application router.
pub fn create_router<R: FileRepository + 'static>(state: AppState<R>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes::<R>())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
