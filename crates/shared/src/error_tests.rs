use super::*;
use rstest::rstest;

#[rstest]
#[case(AppError::Unauthorized("test".into()), 401, "UNAUTHORIZED")]
#[case(AppError::Forbidden("test".into()), 403, "FORBIDDEN")]
#[case(AppError::NotFound("test".into()), 404, "NOT_FOUND")]
#[case(AppError::Validation("test".into()), 400, "VALIDATION_ERROR")]
#[case(AppError::QuotaExceeded("test".into()), 403, "QUOTA_EXCEEDED")]
#[case(AppError::Conflict("test".into()), 409, "CONFLICT")]
#[case(AppError::Database("test".into()), 500, "DATABASE_ERROR")]
#[case(AppError::ServiceUnavailable("test".into()), 503, "SERVICE_UNAVAILABLE")]
#[case(AppError::Internal("test".into()), 500, "INTERNAL_ERROR")]
fn test_app_error_mapping(#[case] err: AppError, #[case] status: u16, #[case] code: &str) {
    assert_eq!(err.status_code(), status);
    assert_eq!(err.error_code(), code);
}

#[test]
fn test_app_error_display() {
    assert_eq!(
        format!("{}", AppError::NotFound("msg".into())),
        "Not found: msg"
    );
    assert_eq!(
        format!("{}", AppError::QuotaExceeded("msg".into())),
        "Quota exceeded: msg"
    );
    assert_eq!(
        format!("{}", AppError::ServiceUnavailable("msg".into())),
        "Service unavailable: msg"
    );
}

#[test]
fn test_server_error_classification() {
    assert!(AppError::Internal(String::new()).is_server_error());
    assert!(AppError::ServiceUnavailable(String::new()).is_server_error());
    assert!(!AppError::Conflict(String::new()).is_server_error());
    assert!(!AppError::QuotaExceeded(String::new()).is_server_error());
}
