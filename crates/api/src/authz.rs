//! Permission guard for mutating routes.
//!
//! Enforced at the handler boundary, before any session is opened: a denied
//! check never reaches the repository, so there is nothing to roll back.

use axum::response::Response;

use nimbuserp_infra::PermissionEvaluator;

use crate::app::errors;
use crate::context::PrincipalContext;

/// Check a permission before a mutating operation.
///
/// A denial maps to a uniform 403 with no detail about which check failed;
/// an evaluator failure surfaces as a generic error with a correlation id.
pub async fn require(
    evaluator: &PermissionEvaluator,
    principal: &PrincipalContext,
    resource: &str,
    action: &str,
) -> Result<(), Response> {
    match evaluator
        .check(principal.principal_id(), resource, action)
        .await
    {
        Ok(true) => Ok(()),
        Ok(false) => Err(errors::forbidden()),
        Err(e) => Err(errors::internal_error(&e)),
    }
}
