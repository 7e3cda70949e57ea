use axum::{routing::get, Router};

pub mod products;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/me/permissions", get(system::my_permissions))
        .nest("/products", products::router())
}
