use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use uuid::Uuid;

use nimbuserp_core::DomainError;
use nimbuserp_infra::RepoError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn unauthorized() -> axum::response::Response {
    json_error(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "authentication required",
    )
}

/// Uniform authorization failure.
///
/// Carries no detail about which check failed (missing grant, missing
/// action, tenant mismatch); callers outside the trust boundary do not get
/// to learn that.
pub fn forbidden() -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden")
}

pub fn validation_error(err: &DomainError) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
}

pub fn repo_error_to_response(err: RepoError) -> axum::response::Response {
    match err {
        RepoError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        RepoError::TenantMismatch => forbidden(),
        RepoError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        RepoError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", "conflict"),
        RepoError::Binding(_) | RepoError::Database { .. } => internal_error(&err),
    }
}

/// Log the real failure under a correlation id; the response body stays
/// generic.
pub fn internal_error(err: &dyn core::fmt::Display) -> axum::response::Response {
    let correlation_id = Uuid::now_v7();
    tracing::error!(correlation_id = %correlation_id, error = %err, "infrastructure failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(json!({
            "error": "internal",
            "message": "internal error",
            "correlation_id": correlation_id.to_string(),
        })),
    )
        .into_response()
}
