use nimbuserp_auth::{PrincipalId, Role};
use nimbuserp_core::TenantId;

/// Tenant context for a request.
///
/// The tenant may be unresolved (the credential carried no tenant claim):
/// such requests proceed, but every tenant-scoped read returns nothing and
/// every write is refused.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: Option<TenantId>,
}

impl TenantContext {
    pub fn new(tenant_id: Option<TenantId>) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated identity + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self {
            principal_id,
            roles,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
