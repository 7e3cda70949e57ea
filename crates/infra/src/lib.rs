//! `nimbuserp-infra` — sqlx/PostgreSQL infrastructure.
//!
//! Holds the pieces that touch a database or another process boundary: the
//! tenant-bound session (transaction + row-level-security binding), the
//! generic tenant-scoped repository, the permission store/evaluator, and the
//! audit sink. In-memory counterparts live next to each Postgres
//! implementation for tests and development.

pub mod audit;
pub mod permissions;
pub mod repository;
pub mod session;

pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use permissions::{
    InMemoryPermissionStore, PermissionEvaluator, PermissionStore, PgPermissionStore,
};
pub use repository::{
    Filter, FilterValue, InMemoryRepository, Page, PgRepository, RecordInput, RecordPatch,
    RepoError, TenantRecord, TenantScopedRepository,
};
pub use session::{TenantSession, NO_TENANT_SENTINEL, TENANT_SESSION_VAR};
