//! File routes: upload, read, metadata, ownership and deletion.

use std::io;

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use futures::{SinkExt, channel::mpsc};
use serde::Deserialize;
use tracing::info;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    middleware::TenantContext,
};
use filestore_core::files::{
    FileRepository, FileStatus, ListFilter, Owner, OwnerType, ReadOptions, ReadResult,
    UploadRequest, sniff::OCTET_STREAM,
};
use filestore_shared::{
    AppError,
    types::{FileId, OwnerId},
};

/// Header a client may use to announce the upload size up front.
pub const DECLARED_SIZE_HEADER: &str = "x-declared-size";

/// Creates the file routes.
pub fn routes<R: FileRepository + 'static>() -> Router<AppState<R>> {
    Router::new()
        // The ingestor meters the body against its own ceiling.
        .route(
            "/files",
            post(upload::<R>)
                .layer(DefaultBodyLimit::disable())
                .get(list_files::<R>),
        )
        .route("/files/usage", get(usage::<R>))
        .route("/files/{id}", get(get_file::<R>).delete(delete_file::<R>))
        .route("/files/{id}/content", get(read_content::<R>))
        .route("/files/{id}/attach", post(attach::<R>))
        .route("/files/{id}/detach", post(detach::<R>))
}

// ============================================================================
// Request Types
// ============================================================================

/// Query string for listing files.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Only records in this status.
    pub status: Option<FileStatus>,
    /// Only records attached to this kind of owner.
    pub owner_type: Option<OwnerType>,
    /// Maximum rows (default 100).
    pub limit: Option<u64>,
}

/// Query string for reading content.
#[derive(Debug, Default, Deserialize)]
pub struct ContentQuery {
    /// Prefer a signed redirect over streaming through the service.
    #[serde(default)]
    pub redirect: bool,
}

/// Request body for attaching a file.
#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    /// Kind of owning entity.
    pub owner_type: OwnerType,
    /// Owning entity ID.
    pub owner_id: OwnerId,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Declared size from the explicit header, else the part's `Content-Length`.
fn declared_size(headers: &HeaderMap, part_headers: &HeaderMap) -> Result<u64, ApiError> {
    let raw = headers
        .get(DECLARED_SIZE_HEADER)
        .or_else(|| part_headers.get(header::CONTENT_LENGTH))
        .ok_or_else(|| {
            AppError::Validation(format!(
                "{DECLARED_SIZE_HEADER} header or part Content-Length is required"
            ))
        })?;

    raw.to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| AppError::Validation("declared size must be a whole number".into()).into())
}

fn parse_file_id(raw: &str) -> Result<FileId, ApiError> {
    raw.parse::<FileId>()
        .map_err(|_| AppError::Validation(format!("invalid file id: {raw}")).into())
}

/// 307 to a signed URL, or the bytes with their stored type and length.
fn content_response(result: ReadResult) -> Response {
    match result {
        ReadResult::Redirect { url, .. } => Redirect::temporary(&url).into_response(),
        ReadResult::Stream {
            body,
            content_type,
            size,
        } => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, size.to_string()),
            ],
            Body::from_stream(body),
        )
            .into_response(),
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/files`
///
/// Streams the `file` part of a multipart body into the upload pipeline.
async fn upload<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut field = loop {
        match multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
        {
            Some(field) if field.name() == Some("file") => break field,
            Some(_) => {}
            None => {
                return Err(AppError::Validation("multipart field 'file' is required".into()).into());
            }
        }
    };

    let original_name = field.file_name().unwrap_or_default().to_string();
    let declared_content_type = field.content_type().unwrap_or(OCTET_STREAM).to_string();
    let declared_size = declared_size(&headers, field.headers())?;

    let (mut tx, rx) = mpsc::channel(state.ingestor.config().stream_buffer_chunks.max(1));
    // Forwards the part into the pipeline. Ends when the part does or when
    // the pipeline stops reading.
    let pump = async move {
        loop {
            let item = match field.chunk().await {
                Ok(Some(chunk)) => Ok(chunk),
                Ok(None) => break,
                Err(e) => Err(io::Error::other(e.body_text())),
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    };

    let request = UploadRequest {
        tenant_id: tenant.tenant_id(),
        body: Box::pin(rx),
        original_name,
        declared_content_type,
        declared_size,
        bucket: None,
        metadata: None,
    };

    let ((), result) = futures::join!(pump, state.ingestor.upload(request));
    let result = result?;

    Ok((StatusCode::CREATED, Json(result)).into_response())
}

/// GET `/files`
async fn list_files<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Response> {
    let filter = ListFilter {
        status: query.status,
        owner_type: query.owner_type,
        limit: query.limit,
    };
    let files = state.registry.list(tenant.tenant_id(), &filter).await?;

    Ok(Json(files).into_response())
}

/// GET `/files/usage`
async fn usage<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
) -> ApiResult<Response> {
    let usage = state.registry.usage(tenant.tenant_id()).await?;
    Ok(Json(usage).into_response())
}

/// GET `/files/{id}`
async fn get_file<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_file_id(&id)?;
    let record = state.registry.get_metadata(tenant.tenant_id(), id).await?;
    Ok(Json(record).into_response())
}

/// GET `/files/{id}/content`
async fn read_content<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
    Path(id): Path<String>,
    Query(query): Query<ContentQuery>,
) -> ApiResult<Response> {
    let id = parse_file_id(&id)?;
    let options = ReadOptions {
        prefer_redirect: query.redirect,
    };

    let result = state.registry.read(tenant.tenant_id(), id, options).await?;
    Ok(content_response(result))
}

/// POST `/files/{id}/attach`
async fn attach<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
    Path(id): Path<String>,
    Json(payload): Json<AttachRequest>,
) -> ApiResult<Response> {
    let id = parse_file_id(&id)?;
    if payload.owner_id.is_nil() {
        return Err(AppError::Validation("owner_id is required".into()).into());
    }

    let owner = Owner::new(payload.owner_type, payload.owner_id);
    let record = state.registry.attach(tenant.tenant_id(), id, owner).await?;

    Ok(Json(record).into_response())
}

/// POST `/files/{id}/detach`
async fn detach<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_file_id(&id)?;
    state.registry.detach(tenant.tenant_id(), id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// DELETE `/files/{id}`
///
/// Soft-deletes the record; the blob goes on the next deferred sweep.
async fn delete_file<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_file_id(&id)?;
    state
        .registry
        .mark_for_deletion(tenant.tenant_id(), id)
        .await?;

    info!(file_id = %id, "Deletion accepted");
    Ok(StatusCode::ACCEPTED.into_response())
}
