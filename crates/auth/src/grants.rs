//! Permission grants and the pure grant-decision function.
//!
//! A grant authorizes one principal to perform a set of named actions on one
//! named resource. Grant storage and lifecycle (creation, revocation) live
//! in the infrastructure layer; this module only decides.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PrincipalId;

/// Wildcard action: a grant carrying `"*"` allows every action on its
/// resource.
pub const ACTION_WILDCARD: &str = "*";

/// Resource names known to this deployment.
///
/// Handlers reference these constants instead of scattering literals; the
/// default [`ActionVocabulary`] is keyed by the same names.
pub const PRODUCTS_RESOURCE: &str = "products";
pub const PERMISSIONS_RESOURCE: &str = "permissions";

/// A stored permission grant.
///
/// At most one grant exists per `(principal_id, resource)` pair; the action
/// set is the complete authorization for that principal on that resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub principal_id: PrincipalId,
    pub resource: String,
    pub actions: BTreeSet<String>,
    pub description: Option<String>,
}

impl PermissionGrant {
    pub fn new(
        principal_id: PrincipalId,
        resource: impl Into<String>,
        actions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            principal_id,
            resource: resource.into(),
            actions: actions.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    pub fn allows(&self, action: &str) -> bool {
        self.actions.contains(ACTION_WILDCARD) || self.actions.contains(action)
    }
}

/// Decide whether a grant set permits `action` on `resource`.
///
/// True iff a grant for `resource` exists whose action set contains `action`
/// (or the wildcard). Every other case (no grant, grant without the action)
/// is false. No IO, no panics.
pub fn grants_allow(grants: &[PermissionGrant], resource: &str, action: &str) -> bool {
    grants
        .iter()
        .filter(|g| g.resource == resource)
        .any(|g| g.allows(action))
}

// ─────────────────────────────────────────────────────────────────────────────
// Action Vocabulary
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantValidationError {
    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("action '{action}' is not defined for resource '{resource}'")]
    UnknownAction { resource: String, action: String },
}

/// Central allow-list of action names per resource.
///
/// Actions stay an open set of strings (no fixed enum), but every grant is
/// validated against this vocabulary when it is written, so action names
/// cannot silently diverge across call sites.
#[derive(Debug, Clone, Default)]
pub struct ActionVocabulary {
    resources: HashMap<String, BTreeSet<String>>,
}

impl ActionVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vocabulary for the resources this deployment ships with.
    pub fn with_defaults() -> Self {
        Self::new()
            .allow(PRODUCTS_RESOURCE, ["read", "create", "update", "delete"])
            .allow(PERMISSIONS_RESOURCE, ["read", "grant", "revoke"])
    }

    pub fn allow(
        mut self,
        resource: impl Into<String>,
        actions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.resources
            .entry(resource.into())
            .or_default()
            .extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn validate_grant(&self, grant: &PermissionGrant) -> Result<(), GrantValidationError> {
        let allowed = self
            .resources
            .get(&grant.resource)
            .ok_or_else(|| GrantValidationError::UnknownResource(grant.resource.clone()))?;

        for action in &grant.actions {
            if action != ACTION_WILDCARD && !allowed.contains(action) {
                return Err(GrantValidationError::UnknownAction {
                    resource: grant.resource.clone(),
                    action: action.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_action_present_in_grant() {
        let principal = PrincipalId::new();
        let grants = vec![PermissionGrant::new(principal, "products", ["read", "create"])];

        assert!(grants_allow(&grants, "products", "read"));
        assert!(grants_allow(&grants, "products", "create"));
    }

    #[test]
    fn denies_action_missing_from_grant() {
        let principal = PrincipalId::new();
        let grants = vec![PermissionGrant::new(principal, "products", ["read"])];

        assert!(!grants_allow(&grants, "products", "delete"));
    }

    #[test]
    fn denies_when_no_grant_exists_for_resource() {
        let principal = PrincipalId::new();
        let grants = vec![PermissionGrant::new(principal, "products", ["read"])];

        assert!(!grants_allow(&grants, "invoices", "read"));
        assert!(!grants_allow(&[], "products", "read"));
    }

    #[test]
    fn wildcard_allows_every_action_on_its_resource_only() {
        let principal = PrincipalId::new();
        let grants = vec![PermissionGrant::new(principal, "products", [ACTION_WILDCARD])];

        assert!(grants_allow(&grants, "products", "delete"));
        assert!(grants_allow(&grants, "products", "anything"));
        assert!(!grants_allow(&grants, "invoices", "delete"));
    }

    #[test]
    fn vocabulary_accepts_known_actions() {
        let vocab = ActionVocabulary::with_defaults();
        let grant = PermissionGrant::new(PrincipalId::new(), PRODUCTS_RESOURCE, ["read", "delete"]);

        assert!(vocab.validate_grant(&grant).is_ok());
    }

    #[test]
    fn vocabulary_rejects_unknown_action_and_resource() {
        let vocab = ActionVocabulary::with_defaults();

        let bad_action = PermissionGrant::new(PrincipalId::new(), PRODUCTS_RESOURCE, ["publish"]);
        assert!(matches!(
            vocab.validate_grant(&bad_action),
            Err(GrantValidationError::UnknownAction { .. })
        ));

        let bad_resource = PermissionGrant::new(PrincipalId::new(), "warehouses", ["read"]);
        assert!(matches!(
            vocab.validate_grant(&bad_resource),
            Err(GrantValidationError::UnknownResource(_))
        ));
    }

    #[test]
    fn wildcard_passes_vocabulary_validation() {
        let vocab = ActionVocabulary::with_defaults();
        let grant = PermissionGrant::new(PrincipalId::new(), PRODUCTS_RESOURCE, [ACTION_WILDCARD]);

        assert!(vocab.validate_grant(&grant).is_ok());
    }
}
