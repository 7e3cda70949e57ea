//! `nimbuserp-auth` — pure authentication/authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: token
//! decoding is transport-agnostic, and grant evaluation is a pure policy
//! check over data loaded elsewhere.

pub mod claims;
pub mod grants;
pub mod principal;

pub use claims::{ClaimsError, TokenClaims, TokenDecoder, TENANT_CLAIM_KEYS};
pub use grants::{
    grants_allow, ActionVocabulary, GrantValidationError, PermissionGrant, ACTION_WILDCARD,
    PERMISSIONS_RESOURCE, PRODUCTS_RESOURCE,
};
pub use principal::{PrincipalId, Role};
