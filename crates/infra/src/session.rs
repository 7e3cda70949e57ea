//! Tenant-bound database session.
//!
//! A [`TenantSession`] wraps one transaction and guarantees that the
//! row-level-security variable is configured before any query runs in it.
//! Connections are pooled and reused across tenants, so the binding happens
//! on every transaction, never once per connection; `set_config(..., true)`
//! is transaction-local and cannot outlive commit or rollback.

use std::sync::Arc;

use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use nimbuserp_auth::PrincipalId;
use nimbuserp_core::TenantId;

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::repository::RepoError;

/// Session variable read by the row-level-security policies on every table.
pub const TENANT_SESSION_VAR: &str = "app.current_tenant";

/// Value bound when no tenant is resolved for the request.
///
/// Not a UUID, so it can never equal a `tenant_id::text`; an unresolved
/// tenant sees zero rows instead of inheriting whatever a previous user of
/// the pooled connection had configured.
pub const NO_TENANT_SENTINEL: &str = "__no_tenant__";

/// The value to bind for a resolved (or unresolved) tenant.
pub fn session_var_value(tenant_id: Option<TenantId>) -> String {
    match tenant_id {
        Some(tenant) => tenant.to_string(),
        None => NO_TENANT_SENTINEL.to_string(),
    }
}

/// One transaction, bound to the tenant of the request that opened it.
pub struct TenantSession {
    tx: Transaction<'static, Postgres>,
    tenant_id: Option<TenantId>,
    principal_id: Option<PrincipalId>,
    audit: Arc<dyn AuditSink>,
}

impl TenantSession {
    /// Begin a transaction bound to the current request context.
    ///
    /// Reads the task-local request context; with no context (or no resolved
    /// tenant) the sentinel is bound and every tenant-scoped query matches
    /// nothing.
    pub async fn begin(pool: &PgPool, audit: Arc<dyn AuditSink>) -> Result<Self, RepoError> {
        let ctx = nimbuserp_tenancy::current().unwrap_or_default();
        Self::bind(pool, ctx.tenant_id(), ctx.principal_id(), audit).await
    }

    /// Begin a transaction pinned to an explicit tenant.
    ///
    /// For workers and administrative flows that run outside a request scope.
    pub async fn begin_for(
        pool: &PgPool,
        tenant_id: TenantId,
        principal_id: Option<PrincipalId>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, RepoError> {
        Self::bind(pool, Some(tenant_id), principal_id, audit).await
    }

    #[instrument(skip(pool, audit), err)]
    async fn bind(
        pool: &PgPool,
        tenant_id: Option<TenantId>,
        principal_id: Option<PrincipalId>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, RepoError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| RepoError::database("begin_transaction", e))?;

        let value = session_var_value(tenant_id);
        if let Err(e) = sqlx::query("SELECT set_config($1, $2, true)")
            .bind(TENANT_SESSION_VAR)
            .bind(&value)
            .execute(&mut *tx)
            .await
        {
            // Dropping the transaction rolls it back; a session is never
            // handed out without the binding in place.
            return Err(RepoError::Binding(e.to_string()));
        }

        Ok(Self {
            tx,
            tenant_id,
            principal_id,
            audit,
        })
    }

    /// Tenant this session was bound to, if one was resolved.
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn principal_id(&self) -> Option<PrincipalId> {
        self.principal_id
    }

    pub async fn commit(self) -> Result<(), RepoError> {
        self.tx
            .commit()
            .await
            .map_err(|e| RepoError::database("commit", e))
    }

    pub async fn rollback(self) -> Result<(), RepoError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| RepoError::database("rollback", e))
    }

    pub(crate) fn connection(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }

    pub(crate) fn record_audit(
        &self,
        action: AuditAction,
        entity_type: &'static str,
        entity_id: Uuid,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) {
        self.audit.record(AuditEvent {
            entity_type,
            entity_id,
            action,
            principal_id: self.principal_id,
            tenant_id: self.tenant_id,
            before,
            after,
            occurred_at: chrono::Utc::now(),
        });
    }
}
