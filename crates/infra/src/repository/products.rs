//! Product record binding for the tenant-scoped repository.
//!
//! The reference entity wired through the full stack (routes → session →
//! repository → audit). Other entities follow the same pattern: a row
//! struct, a creation input, and a patch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, Row};
use uuid::Uuid;

use nimbuserp_core::{DomainError, DomainResult, TenantId};

use super::{Filter, FilterValue, RecordInput, RecordPatch, TenantRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_price_cents: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ProductRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRecord {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            unit_price_cents: row.try_get("unit_price_cents")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Creation input. Carries no id and no tenant; both are stamped by the
/// repository.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_price_cents: i64,
    pub active: bool,
}

impl NewProduct {
    pub fn validate(&self) -> DomainResult<()> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.unit_price_cents < 0 {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        Ok(())
    }
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit_price_cents: Option<i64>,
    pub active: Option<bool>,
}

impl ProductPatch {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(sku) = &self.sku {
            if sku.trim().is_empty() {
                return Err(DomainError::validation("sku cannot be empty"));
            }
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("name cannot be empty"));
            }
        }
        if let Some(price) = self.unit_price_cents {
            if price < 0 {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
        }
        Ok(())
    }
}

impl TenantRecord for ProductRecord {
    type Insert = NewProduct;
    type Patch = ProductPatch;

    const TABLE: &'static str = "products";
    const SELECT_COLUMNS: &'static str =
        "id, tenant_id, sku, name, description, unit_price_cents, active, created_at";
    const ENTITY_TYPE: &'static str = "product";
    const FILTER_COLUMNS: &'static [&'static str] = &["sku", "name", "active"];

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_tenant_id(&self) -> TenantId {
        TenantId::from_uuid(self.tenant_id)
    }

    fn matches(&self, filter: &Filter) -> bool {
        match (filter.column.as_str(), &filter.value) {
            ("sku", FilterValue::Text(v)) => self.sku == *v,
            ("name", FilterValue::Text(v)) => self.name == *v,
            ("active", FilterValue::Bool(v)) => self.active == *v,
            _ => false,
        }
    }
}

impl RecordInput<ProductRecord> for NewProduct {
    const COLUMNS: &'static [&'static str] =
        &["sku", "name", "description", "unit_price_cents", "active"];

    fn push_values(&self, values: &mut Separated<'_, '_, Postgres, &'static str>) {
        values.push_bind(self.sku.clone());
        values.push_bind(self.name.clone());
        values.push_bind(self.description.clone());
        values.push_bind(self.unit_price_cents);
        values.push_bind(self.active);
    }

    fn materialize(
        &self,
        id: Uuid,
        tenant_id: TenantId,
        created_at: DateTime<Utc>,
    ) -> ProductRecord {
        ProductRecord {
            id,
            tenant_id: *tenant_id.as_uuid(),
            sku: self.sku.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            unit_price_cents: self.unit_price_cents,
            active: self.active,
            created_at,
        }
    }
}

impl RecordPatch<ProductRecord> for ProductPatch {
    fn is_empty(&self) -> bool {
        self.sku.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.unit_price_cents.is_none()
            && self.active.is_none()
    }

    fn push_set_clauses(&self, sets: &mut Separated<'_, '_, Postgres, &'static str>) {
        if let Some(sku) = &self.sku {
            sets.push("sku = ");
            sets.push_bind_unseparated(sku.clone());
        }
        if let Some(name) = &self.name {
            sets.push("name = ");
            sets.push_bind_unseparated(name.clone());
        }
        if let Some(description) = &self.description {
            sets.push("description = ");
            sets.push_bind_unseparated(description.clone());
        }
        if let Some(price) = self.unit_price_cents {
            sets.push("unit_price_cents = ");
            sets.push_bind_unseparated(price);
        }
        if let Some(active) = self.active {
            sets.push("active = ");
            sets.push_bind_unseparated(active);
        }
    }

    fn apply(&self, record: &mut ProductRecord) {
        if let Some(sku) = &self.sku {
            record.sku = sku.clone();
        }
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(description) = &self.description {
            record.description = Some(description.clone());
        }
        if let Some(price) = self.unit_price_cents {
            record.unit_price_cents = price;
        }
        if let Some(active) = self.active {
            record.active = active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_product_validation() {
        let mut input = NewProduct {
            sku: "SKU-1".into(),
            name: "Widget".into(),
            description: None,
            unit_price_cents: 100,
            active: true,
        };
        assert!(input.validate().is_ok());

        input.sku = "   ".into();
        assert!(matches!(
            input.validate(),
            Err(DomainError::Validation(_))
        ));

        input.sku = "SKU-1".into();
        input.unit_price_cents = -1;
        assert!(input.validate().is_err());
    }

    #[test]
    fn patch_validation_checks_only_present_fields() {
        assert!(ProductPatch::default().validate().is_ok());
        assert!(ProductPatch::default().is_empty());

        let patch = ProductPatch {
            name: Some("".into()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
        assert!(!patch.is_empty());
    }

    #[test]
    fn filter_matching_covers_declared_columns() {
        let record = ProductRecord {
            id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            sku: "SKU-1".into(),
            name: "Widget".into(),
            description: None,
            unit_price_cents: 100,
            active: true,
            created_at: Utc::now(),
        };

        assert!(record.matches(&Filter::text("sku", "SKU-1")));
        assert!(record.matches(&Filter::boolean("active", true)));
        assert!(!record.matches(&Filter::text("name", "Other")));
    }
}
