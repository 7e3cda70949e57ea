//! In-memory tenant-scoped repository for tests and development.
//!
//! Mirrors the Postgres backend's semantics (tenant stamping, the NotFound
//! equivalence for cross-tenant ids, scope-mismatch behavior) so the
//! tenant-isolation properties can be exercised without a database.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use nimbuserp_auth::PrincipalId;
use nimbuserp_core::TenantId;

use crate::audit::{snapshot, AuditAction, AuditEvent, AuditSink};

use super::{
    validate_filters, Filter, Page, RecordInput, RecordPatch, RepoError, TenantRecord,
    TenantScopedRepository,
};

pub struct InMemoryRepository<R: TenantRecord> {
    records: Arc<RwLock<HashMap<Uuid, R>>>,
    bound_tenant: Option<TenantId>,
    principal_id: Option<PrincipalId>,
    audit: Arc<dyn AuditSink>,
}

impl<R: TenantRecord> InMemoryRepository<R> {
    /// Repository bound to one tenant, as a request session would be.
    pub fn bound_to(tenant: TenantId, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            bound_tenant: Some(tenant),
            principal_id: None,
            audit,
        }
    }

    /// Repository with no resolved tenant (anonymous request scope).
    pub fn unbound(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            bound_tenant: None,
            principal_id: None,
            audit,
        }
    }

    pub fn with_principal(mut self, principal_id: PrincipalId) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    /// Same backing store, rebound to a different request scope.
    pub fn rebind(&self, tenant: Option<TenantId>) -> Self {
        Self {
            records: Arc::clone(&self.records),
            bound_tenant: tenant,
            principal_id: self.principal_id,
            audit: Arc::clone(&self.audit),
        }
    }

    fn read_scope_matches(&self, tenant: TenantId) -> bool {
        self.bound_tenant == Some(tenant)
    }

    fn lock_error(operation: &'static str) -> RepoError {
        RepoError::Database {
            operation,
            message: "lock poisoned".to_string(),
        }
    }

    fn record_audit(
        &self,
        action: AuditAction,
        entity_id: Uuid,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) {
        self.audit.record(AuditEvent {
            entity_type: R::ENTITY_TYPE,
            entity_id,
            action,
            principal_id: self.principal_id,
            tenant_id: self.bound_tenant,
            before,
            after,
            occurred_at: Utc::now(),
        });
    }
}

#[async_trait]
impl<R: TenantRecord> TenantScopedRepository<R> for InMemoryRepository<R> {
    async fn get_by_id(&mut self, id: Uuid, tenant: TenantId) -> Result<R, RepoError> {
        if !self.read_scope_matches(tenant) {
            return Err(RepoError::NotFound);
        }

        let records = self
            .records
            .read()
            .map_err(|_| Self::lock_error("get_by_id"))?;
        records
            .get(&id)
            .filter(|r| r.record_tenant_id() == tenant)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn get_all(&mut self, tenant: TenantId) -> Result<Vec<R>, RepoError> {
        if !self.read_scope_matches(tenant) {
            return Ok(Vec::new());
        }

        let records = self
            .records
            .read()
            .map_err(|_| Self::lock_error("get_all"))?;
        let mut found: Vec<R> = records
            .values()
            .filter(|r| r.record_tenant_id() == tenant)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.record_id());
        Ok(found)
    }

    async fn get_multi(
        &mut self,
        tenant: TenantId,
        page: Page,
        filters: &[Filter],
    ) -> Result<Vec<R>, RepoError> {
        validate_filters::<R>(filters)?;
        if !self.read_scope_matches(tenant) {
            return Ok(Vec::new());
        }

        let records = self
            .records
            .read()
            .map_err(|_| Self::lock_error("get_multi"))?;
        let mut found: Vec<R> = records
            .values()
            .filter(|r| r.record_tenant_id() == tenant)
            .filter(|r| filters.iter().all(|f| r.matches(f)))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.record_id());

        Ok(found
            .into_iter()
            .skip(page.skip() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn create(&mut self, input: &R::Insert, tenant: TenantId) -> Result<R, RepoError> {
        if self.bound_tenant != Some(tenant) {
            return Err(RepoError::TenantMismatch);
        }

        let id = Uuid::now_v7();
        let record = input.materialize(id, tenant, Utc::now());

        let mut records = self
            .records
            .write()
            .map_err(|_| Self::lock_error("create"))?;
        records.insert(id, record.clone());
        drop(records);

        self.record_audit(AuditAction::Created, id, None, snapshot(&record));
        Ok(record)
    }

    async fn update(
        &mut self,
        id: Uuid,
        patch: &R::Patch,
        tenant: TenantId,
    ) -> Result<R, RepoError> {
        let before = self.get_by_id(id, tenant).await?;
        if patch.is_empty() {
            return Ok(before);
        }

        let mut updated = before.clone();
        patch.apply(&mut updated);

        let mut records = self
            .records
            .write()
            .map_err(|_| Self::lock_error("update"))?;
        records.insert(id, updated.clone());
        drop(records);

        self.record_audit(
            AuditAction::Updated,
            id,
            snapshot(&before),
            snapshot(&updated),
        );
        Ok(updated)
    }

    async fn delete(&mut self, id: Uuid, tenant: TenantId) -> Result<bool, RepoError> {
        let before = match self.get_by_id(id, tenant).await {
            Ok(record) => record,
            Err(RepoError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };

        let mut records = self
            .records
            .write()
            .map_err(|_| Self::lock_error("delete"))?;
        let removed = records.remove(&id).is_some();
        drop(records);

        if removed {
            self.record_audit(AuditAction::Deleted, id, snapshot(&before), None);
        }
        Ok(removed)
    }
}
