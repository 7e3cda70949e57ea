//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use sqlx::PgPool;
use tower::ServiceBuilder;

use nimbuserp_auth::TokenDecoder;
use nimbuserp_infra::{AuditSink, PermissionEvaluator};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Shared service handles available to every handler.
pub struct AppServices {
    pub pool: PgPool,
    pub permissions: PermissionEvaluator,
    pub audit: Arc<dyn AuditSink>,
}

impl AppServices {
    pub fn new(pool: PgPool, permissions: PermissionEvaluator, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            pool,
            permissions,
            audit,
        }
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(decoder: Arc<TokenDecoder>, services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState { decoder };

    // Protected routes: require auth + tenant context.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
