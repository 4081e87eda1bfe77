//! Tenant context extraction.
//!
//! Authentication happens upstream; by the time a request reaches this
//! service the gateway has resolved the caller's tenant and forwarded it in
//! the `X-Tenant-Id` header.

use axum::{extract::FromRequestParts, http::request::Parts};
use filestore_shared::{AppError, types::TenantId};

use crate::error::ApiError;

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Extractor for the calling tenant.
///
/// ```ignore
/// async fn handler(tenant: TenantContext) -> impl IntoResponse {
///     let tenant_id = tenant.tenant_id();
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TenantContext(pub TenantId);

impl TenantContext {
    /// Returns the tenant ID.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.0
    }
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("X-Tenant-Id header is required".into()))?;

        let tenant_id = value
            .trim()
            .parse::<TenantId>()
            .ok()
            .filter(|id| !id.is_nil())
            .ok_or_else(|| AppError::Unauthorized("X-Tenant-Id is not a valid tenant".into()))?;

        Ok(Self(tenant_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<TenantContext, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(TENANT_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        TenantContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_tenant_header() {
        let tenant = TenantId::new();
        let ctx = extract(Some(&tenant.to_string())).await.unwrap();
        assert_eq!(ctx.tenant_id(), tenant);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_header_is_unauthorized() {
        for header in [None, Some("not-a-uuid"), Some("00000000-0000-0000-0000-000000000000")] {
            let err = extract(header).await.unwrap_err();
            assert!(matches!(err.0, AppError::Unauthorized(_)));
        }
    }
}
