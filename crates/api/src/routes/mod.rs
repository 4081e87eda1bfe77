//! API route definitions.
//!
//! Every route except `/health` resolves the caller's tenant from the
//! `X-Tenant-Id` header.

use axum::Router;

use crate::AppState;
use filestore_core::files::FileRepository;

pub mod files;
pub mod health;
pub mod maintenance;
pub mod owners;

/// Creates the API router with all routes.
pub fn api_routes<R: FileRepository + 'static>() -> Router<AppState<R>> {
    Router::new()
        .merge(health::routes::<R>())
        .merge(files::routes::<R>())
        .merge(owners::routes::<R>())
        .merge(maintenance::routes::<R>())
}
