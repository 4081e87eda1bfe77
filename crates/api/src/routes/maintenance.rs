//! Manual reclamation triggers.

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::info;

use crate::{AppState, error::ApiResult, middleware::TenantContext};
use filestore_core::files::FileRepository;

/// Creates the maintenance routes.
pub fn routes<R: FileRepository + 'static>() -> Router<AppState<R>> {
    Router::new()
        .route("/maintenance/cleanup", post(cleanup::<R>))
        .route("/maintenance/cleanup/tenant", post(cleanup_tenant::<R>))
}

/// POST `/maintenance/cleanup`
///
/// Runs the orphan and deferred sweeps once, outside the schedule.
async fn cleanup<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
) -> ApiResult<Response> {
    let report = state.reaper.run_once().await?;
    info!(
        orphans_deleted = report.orphans.deleted,
        deferred_deleted = report.deferred.deleted,
        "Manual cleanup finished"
    );
    Ok(Json(report).into_response())
}

/// POST `/maintenance/cleanup/tenant`
///
/// Reclaims every live file of the calling tenant.
async fn cleanup_tenant<R: FileRepository + 'static>(
    State(state): State<AppState<R>>,
    tenant: TenantContext,
) -> ApiResult<Response> {
    let report = state.reaper.cleanup_tenant(tenant.tenant_id()).await?;
    Ok(Json(report).into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use filestore_shared::types::TenantId;
    use tower::ServiceExt;

    use crate::test_support::{app, body_json, request, upload_png};

    #[tokio::test]
    async fn test_cleanup_reclaims_deleted_files() {
        let app = app();
        let tenant = TenantId::new();
        let id = upload_png(&app, tenant).await;
        let response = app
            .clone()
            .oneshot(request("DELETE", &format!("/files/{id}"), tenant, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .clone()
            .oneshot(request("POST", "/maintenance/cleanup", tenant, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["deferred"]["deleted"], 1);
        assert_eq!(report["orphans"]["deleted"], 0);

        let response = app
            .oneshot(request("GET", &format!("/files/{id}"), tenant, None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "deleted");
    }

    #[tokio::test]
    async fn test_tenant_cleanup_only_touches_caller() {
        let app = app();
        let tenant = TenantId::new();
        let other = TenantId::new();
        upload_png(&app, tenant).await;
        upload_png(&app, tenant).await;
        let kept = upload_png(&app, other).await;

        let response = app
            .clone()
            .oneshot(request("POST", "/maintenance/cleanup/tenant", tenant, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["deleted"], 2);

        let response = app
            .oneshot(request("GET", &format!("/files/{kept}"), other, None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "uploaded");
    }
}
