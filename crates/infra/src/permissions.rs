//! Permission grant storage and evaluation.
//!
//! Grant lifecycle (creation, revocation) belongs to administrative flows;
//! this module only reads. The evaluator reads through to the store on
//! every call, with no cache, so a revoked grant is invisible to the very
//! next check.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use nimbuserp_auth::{grants_allow, PermissionGrant, PrincipalId};

use crate::repository::RepoError;

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// All grants held by a principal, one per resource.
    async fn grants_for(&self, principal_id: PrincipalId)
        -> Result<Vec<PermissionGrant>, RepoError>;
}

/// Postgres-backed grant store.
pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    #[instrument(skip(self), err)]
    async fn grants_for(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<PermissionGrant>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT principal_id, resource, actions, description
            FROM permission_grants
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("grants_for", e))?;

        let mut grants = Vec::with_capacity(rows.len());
        for row in rows {
            let decode = |e: sqlx::Error| RepoError::Database {
                operation: "grants_for",
                message: e.to_string(),
            };
            let actions: Vec<String> = row.try_get("actions").map_err(decode)?;
            grants.push(PermissionGrant {
                principal_id: PrincipalId::from_uuid(row.try_get("principal_id").map_err(decode)?),
                resource: row.try_get("resource").map_err(decode)?,
                actions: actions.into_iter().collect(),
                description: row.try_get("description").map_err(decode)?,
            });
        }
        Ok(grants)
    }
}

/// In-memory grant store for tests and development.
///
/// Keyed by `(principal, resource)`, which enforces the at-most-one-grant
/// invariant the database schema carries as a unique index.
#[derive(Default)]
pub struct InMemoryPermissionStore {
    grants: RwLock<HashMap<(PrincipalId, String), PermissionGrant>>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the grant for `(principal, resource)`.
    pub fn upsert(&self, grant: PermissionGrant) {
        if let Ok(mut grants) = self.grants.write() {
            grants.insert((grant.principal_id, grant.resource.clone()), grant);
        }
    }

    /// Remove a grant.
    pub fn revoke(&self, principal_id: PrincipalId, resource: &str) {
        if let Ok(mut grants) = self.grants.write() {
            grants.remove(&(principal_id, resource.to_string()));
        }
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn grants_for(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<PermissionGrant>, RepoError> {
        let grants = self.grants.read().map_err(|_| RepoError::Database {
            operation: "grants_for",
            message: "lock poisoned".to_string(),
        })?;
        Ok(grants
            .values()
            .filter(|g| g.principal_id == principal_id)
            .cloned()
            .collect())
    }
}

/// Answers whether a principal may perform an action on a resource.
pub struct PermissionEvaluator {
    store: Arc<dyn PermissionStore>,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }

    /// True iff a grant for `resource` exists and `action` is in its
    /// allowed set. Every other case (no grant, grant without the action)
    /// is false.
    pub async fn check(
        &self,
        principal_id: PrincipalId,
        resource: &str,
        action: &str,
    ) -> Result<bool, RepoError> {
        let grants = self.store.grants_for(principal_id).await?;
        Ok(grants_allow(&grants, resource, action))
    }

    pub async fn get_permissions(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<PermissionGrant>, RepoError> {
        self.store.grants_for(principal_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbuserp_auth::{ACTION_WILDCARD, PRODUCTS_RESOURCE};

    fn evaluator_with_store() -> (PermissionEvaluator, Arc<InMemoryPermissionStore>) {
        let store = Arc::new(InMemoryPermissionStore::new());
        (PermissionEvaluator::new(store.clone()), store)
    }

    #[tokio::test]
    async fn check_is_true_only_for_granted_actions() {
        let (evaluator, store) = evaluator_with_store();
        let principal = PrincipalId::new();

        store.upsert(PermissionGrant::new(
            principal,
            PRODUCTS_RESOURCE,
            ["read", "create"],
        ));

        assert!(evaluator
            .check(principal, PRODUCTS_RESOURCE, "read")
            .await
            .unwrap());
        assert!(!evaluator
            .check(principal, PRODUCTS_RESOURCE, "delete")
            .await
            .unwrap());
        assert!(!evaluator
            .check(principal, "invoices", "read")
            .await
            .unwrap());
        assert!(!evaluator
            .check(PrincipalId::new(), PRODUCTS_RESOURCE, "read")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn revocation_is_visible_to_the_very_next_check() {
        let (evaluator, store) = evaluator_with_store();
        let principal = PrincipalId::new();

        store.upsert(PermissionGrant::new(
            principal,
            PRODUCTS_RESOURCE,
            ["delete"],
        ));
        assert!(evaluator
            .check(principal, PRODUCTS_RESOURCE, "delete")
            .await
            .unwrap());

        store.revoke(principal, PRODUCTS_RESOURCE);
        assert!(!evaluator
            .check(principal, PRODUCTS_RESOURCE, "delete")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn upsert_replaces_the_single_grant_per_resource() {
        let (evaluator, store) = evaluator_with_store();
        let principal = PrincipalId::new();

        store.upsert(PermissionGrant::new(principal, PRODUCTS_RESOURCE, ["read"]));
        store.upsert(PermissionGrant::new(
            principal,
            PRODUCTS_RESOURCE,
            [ACTION_WILDCARD],
        ));

        let grants = evaluator.get_permissions(principal).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert!(evaluator
            .check(principal, PRODUCTS_RESOURCE, "anything")
            .await
            .unwrap());
    }
}
