//! Generic tenant-scoped data access.
//!
//! Every read and write carries a tenant filter at the application level, in
//! addition to the row-level-security binding on the session. The two
//! enforcement points are independent and both mandatory; the repository
//! also checks that its tenant argument matches the tenant the session was
//! bound to, so the layers cannot silently diverge.

pub mod memory;
pub mod pg;
pub mod products;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres};
use thiserror::Error;
use uuid::Uuid;

use nimbuserp_core::TenantId;

pub use memory::InMemoryRepository;
pub use pg::PgRepository;

/// Data-access error.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The record does not exist under the given tenant.
    ///
    /// Deliberately identical whether the id is unknown or the record lives
    /// under another tenant.
    #[error("not found")]
    NotFound,

    /// The tenant argument does not match the tenant the session is bound
    /// to. Raised for writes; reads fail closed as [`RepoError::NotFound`]
    /// or empty result sets instead.
    #[error("tenant scope mismatch")]
    TenantMismatch,

    /// The row-level-security binding could not be configured; the
    /// transaction was aborted.
    #[error("security binding failed: {0}")]
    Binding(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },
}

impl RepoError {
    pub(crate) fn database(operation: &'static str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // Unique violation
            if db_err.code().as_deref() == Some("23505") {
                return Self::Conflict(db_err.message().to_string());
            }
        }
        Self::Database {
            operation,
            message: err.to_string(),
        }
    }
}

/// Pagination window with clamped bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    skip: i64,
    limit: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Clamp `skip` to be non-negative and `limit` to `1..=MAX_LIMIT`.
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip: skip.max(0),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn skip(&self) -> i64 {
        self.skip
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }
}

/// A typed filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
    Int(i64),
    Uuid(Uuid),
}

/// Equality filter on a record column.
///
/// Filters compose with AND semantics and always apply *after* the tenant
/// filter. Column names are validated against the record's filterable
/// column list before any SQL is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: FilterValue,
}

impl Filter {
    pub fn text(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: FilterValue::Text(value.into()),
        }
    }

    pub fn boolean(column: impl Into<String>, value: bool) -> Self {
        Self {
            column: column.into(),
            value: FilterValue::Bool(value),
        }
    }

    pub fn int(column: impl Into<String>, value: i64) -> Self {
        Self {
            column: column.into(),
            value: FilterValue::Int(value),
        }
    }
}

pub(crate) fn validate_filters<R: TenantRecord>(filters: &[Filter]) -> Result<(), RepoError> {
    for filter in filters {
        if !R::FILTER_COLUMNS.contains(&filter.column.as_str()) {
            return Err(RepoError::Validation(format!(
                "unknown filter column: {}",
                filter.column
            )));
        }
    }
    Ok(())
}

/// Capability required of a persisted, tenant-scoped record type.
///
/// `tenant_id` is part of every record and is stamped by the repository at
/// creation time; it never comes from client input and never changes
/// afterwards.
pub trait TenantRecord:
    for<'r> FromRow<'r, PgRow> + Serialize + Clone + Send + Sync + Unpin + 'static
{
    type Insert: RecordInput<Self>;
    type Patch: RecordPatch<Self>;

    const TABLE: &'static str;
    /// Comma-separated column list used for SELECT/RETURNING.
    const SELECT_COLUMNS: &'static str;
    /// Entity type name used in audit events.
    const ENTITY_TYPE: &'static str;
    /// Columns that `get_multi` may filter on.
    const FILTER_COLUMNS: &'static [&'static str];

    fn record_id(&self) -> Uuid;
    fn record_tenant_id(&self) -> TenantId;
    /// Whether this record matches an (already validated) filter.
    fn matches(&self, filter: &Filter) -> bool;
}

/// Creation input for a record type.
///
/// `COLUMNS` never includes `id` or `tenant_id`: both are supplied by the
/// repository, so a tenant value smuggled into the input is simply
/// unrepresentable.
pub trait RecordInput<R>: Send + Sync {
    const COLUMNS: &'static [&'static str];

    /// Bind the input values in `COLUMNS` order.
    fn push_values(&self, values: &mut Separated<'_, '_, Postgres, &'static str>);

    /// Build the record directly (in-memory backend).
    fn materialize(&self, id: Uuid, tenant_id: TenantId, created_at: DateTime<Utc>) -> R;
}

/// Partial-update input for a record type.
///
/// Only fields present in the patch are written; absent fields stay
/// untouched, and an empty patch is a no-op.
pub trait RecordPatch<R>: Send + Sync {
    fn is_empty(&self) -> bool;

    /// Push `column = value` set clauses for each present field.
    fn push_set_clauses(&self, sets: &mut Separated<'_, '_, Postgres, &'static str>);

    /// Apply the patch directly (in-memory backend).
    fn apply(&self, record: &mut R);
}

/// The tenant-scoped repository surface consumed by every entity service.
#[async_trait]
pub trait TenantScopedRepository<R: TenantRecord> {
    /// Fetch one record by id within `tenant`.
    ///
    /// A record under another tenant yields the same [`RepoError::NotFound`]
    /// as a nonexistent id.
    async fn get_by_id(&mut self, id: Uuid, tenant: TenantId) -> Result<R, RepoError>;

    async fn get_all(&mut self, tenant: TenantId) -> Result<Vec<R>, RepoError>;

    async fn get_multi(
        &mut self,
        tenant: TenantId,
        page: Page,
        filters: &[Filter],
    ) -> Result<Vec<R>, RepoError>;

    /// Insert a record; `tenant_id` is stamped from the argument.
    async fn create(&mut self, input: &R::Insert, tenant: TenantId) -> Result<R, RepoError>;

    /// Apply a partial update to a tenant-scoped record.
    async fn update(&mut self, id: Uuid, patch: &R::Patch, tenant: TenantId)
        -> Result<R, RepoError>;

    /// Delete a tenant-scoped record; `false` when nothing was deleted.
    async fn delete(&mut self, id: Uuid, tenant: TenantId) -> Result<bool, RepoError>;
}
