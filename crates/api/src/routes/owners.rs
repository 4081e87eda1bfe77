//! Owner-scoped file routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::{AppState, error::ApiResult, middleware::TenantContext};
use filestore_core::files::{FileRepository, Owner, OwnerType};
use filestore_shared::types::OwnerId;

/// Creates the owner routes.
pub fn routes<R: FileRepository + 'static>() -> Router<AppState<R>> {
    Router::new().route(
        "/owners/{owner_type}/{owner_id}/files",
        get(list_owner_files::<R>).delete(delete_owner_files::<R>),
    )
}

/// Response for an owner teardown.
#[derive(Debug, Serialize)]
pub struct DeleteOwnerFilesResponse {
    /// Files moved to deletion.
    pub count: u64,
}

/// GET `/owners/{owner_type}/{owner_id}/files`
async fn list_owner_files<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
    Path((owner_type, owner_id)): Path<(OwnerType, OwnerId)>,
) -> ApiResult<Response> {
    let owner = Owner::new(owner_type, owner_id);
    let files = state
        .registry
        .find_by_owner(tenant.tenant_id(), owner)
        .await?;

    Ok(Json(files).into_response())
}

/// DELETE `/owners/{owner_type}/{owner_id}/files`
async fn delete_owner_files<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
    Path((owner_type, owner_id)): Path<(OwnerType, OwnerId)>,
) -> ApiResult<Response> {
    let owner = Owner::new(owner_type, owner_id);
    let count = state
        .registry
        .delete_by_owner(tenant.tenant_id(), owner)
        .await?;

    Ok(Json(DeleteOwnerFilesResponse { count }).into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use filestore_shared::types::{OwnerId, TenantId};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::test_support::{app, body_json, request, upload_png};

    #[tokio::test]
    async fn test_owner_files_listed_then_torn_down() {
        let app = app();
        let tenant = TenantId::new();
        let owner_id = OwnerId::new();
        let id = upload_png(&app, tenant).await;
        upload_png(&app, tenant).await;

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/files/{id}/attach"),
                tenant,
                Some(json!({ "owner_type": "excuse", "owner_id": owner_id })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let owner_files = format!("/owners/excuse/{owner_id}/files");
        let response = app
            .clone()
            .oneshot(request("GET", &owner_files, tenant, None))
            .await
            .unwrap();
        let files = body_json(response).await;
        assert_eq!(files.as_array().unwrap().len(), 1);
        assert_eq!(files[0]["id"], id.as_str());

        let response = app
            .clone()
            .oneshot(request("DELETE", &owner_files, tenant, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["count"], 1);

        let response = app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/files/{id}/content"),
                tenant,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request("GET", &owner_files, tenant, None))
            .await
            .unwrap();
        assert!(body_json(response).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_tenant_sees_no_owner_files() {
        let app = app();
        let tenant = TenantId::new();
        let owner_id = OwnerId::new();
        let id = upload_png(&app, tenant).await;
        app.clone()
            .oneshot(request(
                "POST",
                &format!("/files/{id}/attach"),
                tenant,
                Some(json!({ "owner_type": "profile", "owner_id": owner_id })),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(request(
                "DELETE",
                &format!("/owners/profile/{owner_id}/files"),
                TenantId::new(),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["count"], 0);
    }
}
