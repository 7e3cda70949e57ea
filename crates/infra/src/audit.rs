//! Audit events for entity mutations.
//!
//! The core constructs and dispatches audit events; persistence and querying
//! of the audit trail are external concerns.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use nimbuserp_auth::PrincipalId;
use nimbuserp_core::TenantId;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AuditAction::Created => f.write_str("created"),
            AuditAction::Updated => f.write_str("updated"),
            AuditAction::Deleted => f.write_str("deleted"),
        }
    }
}

/// A single entity mutation, as observed by the data-access layer.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub principal_id: Option<PrincipalId>,
    pub tenant_id: Option<TenantId>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub occurred_at: DateTime<Utc>,
}

/// Destination for audit events.
///
/// Dispatch is fire-and-forget: implementations swallow their own failures,
/// and a lost audit event never aborts or rolls back the primary operation.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Serialize a record state for inclusion in an audit event.
///
/// Best-effort: a serialization failure is logged and yields `None` instead
/// of failing the mutation.
pub fn snapshot<T: Serialize>(record: &T) -> Option<Value> {
    match serde_json::to_value(record) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize audit state");
            None
        }
    }
}

/// Sink that emits audit events as structured log records.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            entity_type = event.entity_type,
            entity_id = %event.entity_id,
            action = %event.action,
            principal_id = ?event.principal_id,
            tenant_id = ?event.tenant_id,
            "entity mutation"
        );
    }
}

/// Collecting sink for tests.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_serializes_a_record() {
        #[derive(Serialize)]
        struct Thing {
            name: &'static str,
        }

        let state = snapshot(&Thing { name: "widget" });
        assert_eq!(state, Some(json!({ "name": "widget" })));
    }

    #[test]
    fn in_memory_sink_collects_events() {
        let sink = InMemoryAuditSink::new();
        sink.record(AuditEvent {
            entity_type: "product",
            entity_id: Uuid::now_v7(),
            action: AuditAction::Created,
            principal_id: Some(PrincipalId::new()),
            tenant_id: Some(TenantId::new()),
            before: None,
            after: Some(json!({ "sku": "X-1" })),
            occurred_at: Utc::now(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Created);
    }
}
