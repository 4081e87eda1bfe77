//! Shared fixtures for the route tests.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::{AppState, middleware::TENANT_HEADER};
use filestore_core::files::InMemoryFileRepository;
use filestore_core::storage::OpendalStorage;
use filestore_shared::{
    AppConfig,
    config::{
        DatabaseConfig, QuotaConfig, ReaperConfig, ServerConfig, StorageConfig, StorageProvider,
        UploadConfig,
    },
    types::TenantId,
};

pub type TestState = AppState<InMemoryFileRepository>;

const BOUNDARY: &str = "filestore-test-boundary";

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01";

fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        storage: StorageConfig::new(StorageProvider::Memory),
        upload: UploadConfig::default(),
        reaper: ReaperConfig::default(),
        quota: QuotaConfig::default(),
    }
}

/// State over the in-memory repository and memory blob store.
pub fn test_state() -> TestState {
    let repo = Arc::new(InMemoryFileRepository::new());
    let storage = Arc::new(OpendalStorage::memory().unwrap());
    AppState::new(repo, storage, &test_config())
}

/// Every route, unprefixed, over one fresh state.
pub fn app() -> Router {
    Router::new()
        .merge(crate::routes::api_routes::<InMemoryFileRepository>())
        .with_state(test_state())
}

fn multipart_body(filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(tenant: TenantId, filename: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/files")
        .header(TENANT_HEADER, tenant.to_string())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-declared-size", bytes.len().to_string())
        .body(Body::from(multipart_body(filename, "image/png", bytes)))
        .unwrap()
}

pub fn request(method: &str, uri: &str, tenant: TenantId, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(TENANT_HEADER, tenant.to_string());
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Uploads a small PNG and returns its file id.
pub async fn upload_png(app: &Router, tenant: TenantId) -> String {
    let response = app
        .clone()
        .oneshot(upload_request(tenant, "scan.png", PNG))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["file_id"].as_str().unwrap().to_string()
}
