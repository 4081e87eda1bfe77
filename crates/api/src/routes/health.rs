//! Liveness check for load balancers and the container runtime.
//!
//! Needs no tenant and touches neither Postgres nor the blob store, so it
//! reports the process as up even while a backend is degraded.

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::AppState;
use filestore_core::files::FileRepository;

/// Body of `GET /health`.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `healthy` when the process answers.
    pub status: &'static str,
    /// Crate version of the running binary.
    pub version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Mounts `/health` for any metadata store.
pub fn routes<R: FileRepository + 'static>() -> Router<AppState<R>> {
    Router::new().route("/health", get(health_check))
}
