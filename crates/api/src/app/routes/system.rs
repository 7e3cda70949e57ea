use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::app::{dto, errors, AppServices};
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(json!({
            "principal_id": principal.principal_id().to_string(),
            "tenant_id": tenant.tenant_id().map(|t| t.to_string()),
            "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        })),
    )
        .into_response()
}

pub async fn my_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services
        .permissions
        .get_permissions(principal.principal_id())
        .await
    {
        Ok(grants) => (
            StatusCode::OK,
            Json(json!({
                "permissions": grants.iter().map(dto::grant_to_json).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::internal_error(&e),
    }
}
