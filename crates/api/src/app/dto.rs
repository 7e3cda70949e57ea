//! Request/response DTOs and JSON mapping helpers.

use serde::Deserialize;
use serde_json::{json, Value};

use nimbuserp_auth::PermissionGrant;
use nimbuserp_infra::repository::products::{NewProduct, ProductPatch, ProductRecord};

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit_price_cents: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CreateProductRequest {
    pub fn into_input(self) -> NewProduct {
        NewProduct {
            sku: self.sku,
            name: self.name,
            description: self.description,
            unit_price_cents: self.unit_price_cents,
            active: self.active,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit_price_cents: Option<i64>,
    pub active: Option<bool>,
}

impl UpdateProductRequest {
    pub fn into_patch(self) -> ProductPatch {
        ProductPatch {
            sku: self.sku,
            name: self.name,
            description: self.description,
            unit_price_cents: self.unit_price_cents,
            active: self.active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub sku: Option<String>,
    pub active: Option<bool>,
}

pub fn product_to_json(record: &ProductRecord) -> Value {
    json!({
        "id": record.id.to_string(),
        "sku": record.sku,
        "name": record.name,
        "description": record.description,
        "unit_price_cents": record.unit_price_cents,
        "active": record.active,
        "created_at": record.created_at.to_rfc3339(),
    })
}

pub fn grant_to_json(grant: &PermissionGrant) -> Value {
    json!({
        "resource": grant.resource,
        "actions": grant.actions,
        "description": grant.description,
    })
}
