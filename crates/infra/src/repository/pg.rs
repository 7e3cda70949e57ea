//! Postgres-backed tenant-scoped repository.
//!
//! Every statement filters on `tenant_id` in addition to the
//! row-level-security binding carried by the [`TenantSession`]. Statements
//! are built with `QueryBuilder` and positional binds; column names come
//! exclusively from compile-time record metadata, never from input.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use nimbuserp_core::TenantId;

use crate::audit::{snapshot, AuditAction};
use crate::session::TenantSession;

use super::{
    validate_filters, Filter, FilterValue, Page, RecordInput, RecordPatch, RepoError,
    TenantRecord, TenantScopedRepository,
};

pub struct PgRepository<'s, R: TenantRecord> {
    session: &'s mut TenantSession,
    _record: PhantomData<R>,
}

impl<'s, R: TenantRecord> PgRepository<'s, R> {
    pub fn new(session: &'s mut TenantSession) -> Self {
        Self {
            session,
            _record: PhantomData,
        }
    }

    /// Reads under a session bound to a different (or no) tenant fail
    /// closed: the caller sees NotFound/empty, exactly as if the records
    /// did not exist.
    fn read_scope_matches(&self, tenant: TenantId) -> bool {
        self.session.tenant_id() == Some(tenant)
    }

    fn decode_row(row: &sqlx::postgres::PgRow) -> Result<R, RepoError> {
        R::from_row(row).map_err(|e| RepoError::database("decode_row", e))
    }
}

fn select_sql<R: TenantRecord>() -> String {
    format!(
        "SELECT {} FROM {} WHERE tenant_id = $1",
        R::SELECT_COLUMNS,
        R::TABLE
    )
}

fn delete_sql<R: TenantRecord>() -> String {
    format!("DELETE FROM {} WHERE tenant_id = $1 AND id = $2", R::TABLE)
}

fn push_filter_value(qb: &mut QueryBuilder<'static, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Text(v) => qb.push_bind(v.clone()),
        FilterValue::Bool(v) => qb.push_bind(*v),
        FilterValue::Int(v) => qb.push_bind(*v),
        FilterValue::Uuid(v) => qb.push_bind(*v),
    };
}

fn build_select_page<R: TenantRecord>(
    tenant: TenantId,
    page: Page,
    filters: &[Filter],
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM {} WHERE tenant_id = ",
        R::SELECT_COLUMNS,
        R::TABLE
    ));
    qb.push_bind(*tenant.as_uuid());

    for filter in filters {
        qb.push(format!(" AND {} = ", filter.column));
        push_filter_value(&mut qb, &filter.value);
    }

    qb.push(" ORDER BY id LIMIT ");
    qb.push_bind(page.limit());
    qb.push(" OFFSET ");
    qb.push_bind(page.skip());
    qb
}

fn build_insert<R: TenantRecord>(
    id: Uuid,
    tenant: TenantId,
    input: &R::Insert,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} (id, tenant_id", R::TABLE));
    for column in <R::Insert as RecordInput<R>>::COLUMNS {
        qb.push(", ");
        qb.push(*column);
    }
    qb.push(") VALUES (");

    let mut values = qb.separated(", ");
    values.push_bind(id);
    values.push_bind(*tenant.as_uuid());
    input.push_values(&mut values);

    qb.push(") RETURNING ");
    qb.push(R::SELECT_COLUMNS);
    qb
}

fn build_update<R: TenantRecord>(
    id: Uuid,
    tenant: TenantId,
    patch: &R::Patch,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", R::TABLE));

    let mut sets = qb.separated(", ");
    patch.push_set_clauses(&mut sets);

    qb.push(" WHERE tenant_id = ");
    qb.push_bind(*tenant.as_uuid());
    qb.push(" AND id = ");
    qb.push_bind(id);
    qb.push(" RETURNING ");
    qb.push(R::SELECT_COLUMNS);
    qb
}

#[async_trait]
impl<'s, R: TenantRecord> TenantScopedRepository<R> for PgRepository<'s, R> {
    async fn get_by_id(&mut self, id: Uuid, tenant: TenantId) -> Result<R, RepoError> {
        if !self.read_scope_matches(tenant) {
            return Err(RepoError::NotFound);
        }

        let sql = format!("{} AND id = $2", select_sql::<R>());
        let row = sqlx::query(&sql)
            .bind(*tenant.as_uuid())
            .bind(id)
            .fetch_optional(self.session.connection())
            .await
            .map_err(|e| RepoError::database("get_by_id", e))?;

        match row {
            Some(row) => Self::decode_row(&row),
            None => Err(RepoError::NotFound),
        }
    }

    async fn get_all(&mut self, tenant: TenantId) -> Result<Vec<R>, RepoError> {
        if !self.read_scope_matches(tenant) {
            return Ok(Vec::new());
        }

        let sql = format!("{} ORDER BY id", select_sql::<R>());
        let rows = sqlx::query(&sql)
            .bind(*tenant.as_uuid())
            .fetch_all(self.session.connection())
            .await
            .map_err(|e| RepoError::database("get_all", e))?;

        rows.iter().map(Self::decode_row).collect()
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

        let mut qb = build_select_page::<R>(tenant, page, filters);
        let rows = qb
            .build()
            .fetch_all(self.session.connection())
            .await
            .map_err(|e| RepoError::database("get_multi", e))?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn create(&mut self, input: &R::Insert, tenant: TenantId) -> Result<R, RepoError> {
        if self.session.tenant_id() != Some(tenant) {
            return Err(RepoError::TenantMismatch);
        }

        let id = Uuid::now_v7();
        let mut qb = build_insert::<R>(id, tenant, input);
        let row = qb
            .build()
            .fetch_one(self.session.connection())
            .await
            .map_err(|e| RepoError::database("create", e))?;
        let record = Self::decode_row(&row)?;

        self.session.record_audit(
            AuditAction::Created,
            R::ENTITY_TYPE,
            record.record_id(),
            None,
            snapshot(&record),
        );
        Ok(record)
    }

    async fn update(
        &mut self,
        id: Uuid,
        patch: &R::Patch,
        tenant: TenantId,
    ) -> Result<R, RepoError> {
        // Tenant-scoped load first: a cross-tenant id is NotFound before any
        // write is attempted.
        let before = self.get_by_id(id, tenant).await?;
        if patch.is_empty() {
            return Ok(before);
        }

        let mut qb = build_update::<R>(id, tenant, patch);
        let row = qb
            .build()
            .fetch_optional(self.session.connection())
            .await
            .map_err(|e| RepoError::database("update", e))?;

        let record = match row {
            Some(row) => Self::decode_row(&row)?,
            // Deleted between the load and the update.
            None => return Err(RepoError::NotFound),
        };

        self.session.record_audit(
            AuditAction::Updated,
            R::ENTITY_TYPE,
            record.record_id(),
            snapshot(&before),
            snapshot(&record),
        );
        Ok(record)
    }

    async fn delete(&mut self, id: Uuid, tenant: TenantId) -> Result<bool, RepoError> {
        let before = match self.get_by_id(id, tenant).await {
            Ok(record) => record,
            Err(RepoError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };

        let sql = delete_sql::<R>();
        let result = sqlx::query(&sql)
            .bind(*tenant.as_uuid())
            .bind(id)
            .execute(self.session.connection())
            .await
            .map_err(|e| RepoError::database("delete", e))?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.session.record_audit(
            AuditAction::Deleted,
            R::ENTITY_TYPE,
            before.record_id(),
            snapshot(&before),
            None,
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::products::{NewProduct, ProductPatch, ProductRecord};
    use super::*;

    #[test]
    fn select_and_delete_statements_filter_by_tenant_and_id() {
        let select = select_sql::<ProductRecord>();
        assert_eq!(
            select,
            "SELECT id, tenant_id, sku, name, description, unit_price_cents, active, created_at \
             FROM products WHERE tenant_id = $1"
        );

        let delete = delete_sql::<ProductRecord>();
        assert_eq!(
            delete,
            "DELETE FROM products WHERE tenant_id = $1 AND id = $2"
        );
    }

    #[test]
    fn insert_statement_stamps_id_and_tenant_columns() {
        let input = NewProduct {
            sku: "SKU-1".into(),
            name: "Widget".into(),
            description: None,
            unit_price_cents: 1200,
            active: true,
        };
        let qb = build_insert::<ProductRecord>(Uuid::now_v7(), TenantId::new(), &input);
        let sql = qb.sql();

        assert!(sql.starts_with(
            "INSERT INTO products (id, tenant_id, sku, name, description, unit_price_cents, active) VALUES ($1, $2,"
        ));
        assert!(sql.contains("RETURNING id, tenant_id, sku"));
    }

    #[test]
    fn update_statement_only_sets_present_fields() {
        let patch = ProductPatch {
            name: Some("Renamed".into()),
            active: Some(false),
            ..Default::default()
        };
        let qb = build_update::<ProductRecord>(Uuid::now_v7(), TenantId::new(), &patch);
        let sql = qb.sql();

        assert!(sql.starts_with("UPDATE products SET name = $1, active = $2 WHERE tenant_id = $3 AND id = $4"));
        assert!(!sql.contains("sku ="));
    }

    #[test]
    fn paged_select_composes_filters_with_and() {
        let filters = vec![
            Filter::text("sku", "SKU-1"),
            Filter::boolean("active", true),
        ];
        let qb = build_select_page::<ProductRecord>(TenantId::new(), Page::new(10, 5), &filters);
        let sql = qb.sql();

        assert!(sql.contains("WHERE tenant_id = $1 AND sku = $2 AND active = $3"));
        assert!(sql.ends_with("ORDER BY id LIMIT $4 OFFSET $5"));
    }
}
