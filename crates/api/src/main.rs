use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use nimbuserp_api::app::{build_app, AppServices};
use nimbuserp_api::config::AppConfig;
use nimbuserp_auth::TokenDecoder;
use nimbuserp_infra::{PermissionEvaluator, PgPermissionStore, TracingAuditSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nimbuserp_observability::init();

    let config = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate::Migrator::new(std::path::Path::new("migrations"))
        .await?
        .run(&pool)
        .await?;

    let store = Arc::new(PgPermissionStore::new(pool.clone()));
    let services = Arc::new(AppServices::new(
        pool,
        PermissionEvaluator::new(store),
        Arc::new(TracingAuditSink),
    ));
    let decoder = Arc::new(TokenDecoder::hs256(config.jwt_secret.as_bytes()));

    let app = build_app(decoder, services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
