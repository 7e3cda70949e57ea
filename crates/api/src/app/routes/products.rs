use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use nimbuserp_auth::PRODUCTS_RESOURCE;
use nimbuserp_infra::repository::products::ProductRecord;
use nimbuserp_infra::{Filter, Page, PgRepository, TenantScopedRepository, TenantSession};

use crate::app::{dto, errors, AppServices};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route(
            "/:id",
            get(get_product)
                .patch(update_product)
                .delete(delete_product),
        )
}

fn parse_id(id: &str) -> Result<Uuid, axum::response::Response> {
    id.parse::<Uuid>().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id")
    })
}

async fn abort(session: TenantSession) {
    if let Err(e) = session.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    if let Err(denied) =
        authz::require(&services.permissions, &principal, PRODUCTS_RESOURCE, "create").await
    {
        return denied;
    }
    let Some(tenant_id) = tenant.tenant_id() else {
        return errors::forbidden();
    };

    let input = body.into_input();
    if let Err(e) = input.validate() {
        return errors::validation_error(&e);
    }

    let mut session = match TenantSession::begin(&services.pool, services.audit.clone()).await {
        Ok(session) => session,
        Err(e) => return errors::repo_error_to_response(e),
    };

    let created = PgRepository::<ProductRecord>::new(&mut session)
        .create(&input, tenant_id)
        .await;
    let record = match created {
        Ok(record) => record,
        Err(e) => {
            abort(session).await;
            return errors::repo_error_to_response(e);
        }
    };

    if let Err(e) = session.commit().await {
        return errors::repo_error_to_response(e);
    }

    (StatusCode::CREATED, Json(dto::product_to_json(&record))).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Some(tenant_id) = tenant.tenant_id() else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found");
    };

    let mut session = match TenantSession::begin(&services.pool, services.audit.clone()).await {
        Ok(session) => session,
        Err(e) => return errors::repo_error_to_response(e),
    };

    let found = PgRepository::<ProductRecord>::new(&mut session)
        .get_by_id(id, tenant_id)
        .await;
    match found {
        Ok(record) => {
            if let Err(e) = session.commit().await {
                return errors::repo_error_to_response(e);
            }
            (StatusCode::OK, Json(dto::product_to_json(&record))).into_response()
        }
        Err(e) => {
            abort(session).await;
            errors::repo_error_to_response(e)
        }
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::ListProductsQuery>,
) -> axum::response::Response {
    // No tenant resolved: fail closed with an empty result set.
    let Some(tenant_id) = tenant.tenant_id() else {
        return (StatusCode::OK, Json(json!({ "items": [] }))).into_response();
    };

    let page = Page::new(
        query.skip.unwrap_or(0),
        query.limit.unwrap_or(Page::DEFAULT_LIMIT),
    );
    let mut filters = Vec::new();
    if let Some(sku) = query.sku {
        filters.push(Filter::text("sku", sku));
    }
    if let Some(active) = query.active {
        filters.push(Filter::boolean("active", active));
    }

    let mut session = match TenantSession::begin(&services.pool, services.audit.clone()).await {
        Ok(session) => session,
        Err(e) => return errors::repo_error_to_response(e),
    };

    let found = PgRepository::<ProductRecord>::new(&mut session)
        .get_multi(tenant_id, page, &filters)
        .await;
    match found {
        Ok(records) => {
            if let Err(e) = session.commit().await {
                return errors::repo_error_to_response(e);
            }
            let items = records.iter().map(dto::product_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(json!({ "items": items }))).into_response()
        }
        Err(e) => {
            abort(session).await;
            errors::repo_error_to_response(e)
        }
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> axum::response::Response {
    if let Err(denied) =
        authz::require(&services.permissions, &principal, PRODUCTS_RESOURCE, "update").await
    {
        return denied;
    }
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Some(tenant_id) = tenant.tenant_id() else {
        return errors::forbidden();
    };

    let patch = body.into_patch();
    if let Err(e) = patch.validate() {
        return errors::validation_error(&e);
    }

    let mut session = match TenantSession::begin(&services.pool, services.audit.clone()).await {
        Ok(session) => session,
        Err(e) => return errors::repo_error_to_response(e),
    };

    let updated = PgRepository::<ProductRecord>::new(&mut session)
        .update(id, &patch, tenant_id)
        .await;
    let record = match updated {
        Ok(record) => record,
        Err(e) => {
            abort(session).await;
            return errors::repo_error_to_response(e);
        }
    };

    if let Err(e) = session.commit().await {
        return errors::repo_error_to_response(e);
    }

    (StatusCode::OK, Json(dto::product_to_json(&record))).into_response()
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(denied) =
        authz::require(&services.permissions, &principal, PRODUCTS_RESOURCE, "delete").await
    {
        return denied;
    }
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Some(tenant_id) = tenant.tenant_id() else {
        return errors::forbidden();
    };

    let mut session = match TenantSession::begin(&services.pool, services.audit.clone()).await {
        Ok(session) => session,
        Err(e) => return errors::repo_error_to_response(e),
    };

    let deleted = PgRepository::<ProductRecord>::new(&mut session)
        .delete(id, tenant_id)
        .await;
    let deleted = match deleted {
        Ok(deleted) => deleted,
        Err(e) => {
            abort(session).await;
            return errors::repo_error_to_response(e);
        }
    };

    if let Err(e) = session.commit().await {
        return errors::repo_error_to_response(e);
    }

    if deleted {
        StatusCode::NO_CONTENT.into_response()
    } else {
        errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found")
    }
}
