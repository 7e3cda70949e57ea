//! Bearer-token claims extraction.
//!
//! Tokens are decoded *and signature-verified* here; there is exactly one
//! decoding path, so verification policy cannot drift between entry points.
//! A token that verifies but carries no tenant claim is not an error: the
//! tenant stays unresolved and every downstream component treats that as
//! fail-closed.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use thiserror::Error;

use nimbuserp_core::TenantId;

use crate::{PrincipalId, Role};

/// Accepted tenant claim keys, highest priority first.
///
/// Upstream identity providers have used different names for the tenant
/// claim over time; this list is the single place that knowledge lives.
/// Keys are checked at the payload top level first, then inside the nested
/// [`METADATA_CLAIM_KEY`] object, stopping at the first match.
pub const TENANT_CLAIM_KEYS: &[&str] = &["tenant_id", "empresa_id", "company_id"];

/// Nested object consulted when no top-level tenant claim matches.
pub const METADATA_CLAIM_KEY: &str = "metadata";

/// Claims extracted from a verified bearer token.
///
/// `principal_id` and `tenant_id` are optional at this layer: the HTTP
/// boundary decides what an absent principal means (reject), and the
/// data-access layer decides what an absent tenant means (empty results).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub principal_id: Option<PrincipalId>,
    pub tenant_id: Option<TenantId>,
    pub roles: Vec<Role>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,
}

/// Verifying token decoder (HS256).
///
/// Signature verification is mandatory on every decode; there is no
/// "insecure" constructor.
pub struct TokenDecoder {
    key: DecodingKey,
    validation: Validation,
}

impl TokenDecoder {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Decode and verify a bearer token, then extract the normalized claims.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, ClaimsError> {
        let data = jsonwebtoken::decode::<Value>(token, &self.key, &self.validation)
            .map_err(map_jwt_error)?;
        Ok(extract_claims(&data.claims))
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> ClaimsError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => ClaimsError::Expired,
        ErrorKind::ImmatureSignature => ClaimsError::NotYetValid,
        ErrorKind::InvalidSignature => ClaimsError::InvalidSignature,
        _ => ClaimsError::Malformed,
    }
}

/// Map a verified payload to [`TokenClaims`].
fn extract_claims(payload: &Value) -> TokenClaims {
    let principal_id = payload
        .get("sub")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<PrincipalId>().ok());

    TokenClaims {
        principal_id,
        tenant_id: resolve_tenant(payload),
        roles: extract_roles(payload),
        issued_at: timestamp_claim(payload, "iat"),
        expires_at: timestamp_claim(payload, "exp"),
    }
}

/// Resolve the tenant claim from a token payload.
///
/// Checks [`TENANT_CLAIM_KEYS`] in priority order at the top level, then the
/// same keys inside the nested metadata object. Returns `None` when nothing
/// matches; the caller must treat an unresolved tenant as fail-closed.
pub fn resolve_tenant(payload: &Value) -> Option<TenantId> {
    for key in TENANT_CLAIM_KEYS {
        if let Some(value) = payload.get(*key) {
            if let Some(tenant) = parse_tenant_value(key, value) {
                return Some(tenant);
            }
        }
    }

    let metadata = payload.get(METADATA_CLAIM_KEY)?.as_object()?;
    for key in TENANT_CLAIM_KEYS {
        if let Some(value) = metadata.get(*key) {
            if let Some(tenant) = parse_tenant_value(key, value) {
                return Some(tenant);
            }
        }
    }

    None
}

fn parse_tenant_value(key: &str, value: &Value) -> Option<TenantId> {
    let raw = value.as_str()?;
    match raw.parse::<TenantId>() {
        Ok(tenant) => Some(tenant),
        Err(_) => {
            tracing::warn!(claim = key, "ignoring unparseable tenant claim");
            None
        }
    }
}

fn extract_roles(payload: &Value) -> Vec<Role> {
    if let Some(roles) = payload.get("roles").and_then(Value::as_array) {
        return roles
            .iter()
            .filter_map(Value::as_str)
            .map(Role::new)
            .collect();
    }

    payload
        .get("role")
        .and_then(Value::as_str)
        .map(|r| vec![Role::new(r)])
        .unwrap_or_default()
}

fn timestamp_claim(payload: &Value, key: &str) -> Option<DateTime<Utc>> {
    let ts = payload.get(key)?.as_i64()?;
    DateTime::from_timestamp(ts, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret";

    fn mint(payload: Value) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(SECRET),
        )
        .expect("failed to encode token")
    }

    fn valid_exp() -> i64 {
        (Utc::now() + chrono::Duration::minutes(10)).timestamp()
    }

    fn decoder() -> TokenDecoder {
        TokenDecoder::hs256(SECRET)
    }

    #[test]
    fn resolves_top_level_tenant_claim() {
        let tenant = TenantId::new();
        let sub = PrincipalId::new();
        let token = mint(json!({
            "sub": sub.to_string(),
            "tenant_id": tenant.to_string(),
            "exp": valid_exp(),
        }));

        let claims = decoder().decode(&token).unwrap();
        assert_eq!(claims.principal_id, Some(sub));
        assert_eq!(claims.tenant_id, Some(tenant));
    }

    #[test]
    fn tenant_keys_are_checked_in_priority_order() {
        let first = TenantId::new();
        let second = TenantId::new();
        let token = mint(json!({
            "sub": PrincipalId::new().to_string(),
            "tenant_id": first.to_string(),
            "empresa_id": second.to_string(),
            "exp": valid_exp(),
        }));

        let claims = decoder().decode(&token).unwrap();
        assert_eq!(claims.tenant_id, Some(first));
    }

    #[test]
    fn resolves_tenant_nested_under_metadata() {
        let tenant = TenantId::new();
        let token = mint(json!({
            "sub": PrincipalId::new().to_string(),
            "metadata": { "empresa_id": tenant.to_string() },
            "exp": valid_exp(),
        }));

        let claims = decoder().decode(&token).unwrap();
        assert_eq!(claims.tenant_id, Some(tenant));
    }

    #[test]
    fn top_level_claim_wins_over_nested_metadata() {
        let top = TenantId::new();
        let nested = TenantId::new();
        let token = mint(json!({
            "sub": PrincipalId::new().to_string(),
            "company_id": top.to_string(),
            "metadata": { "tenant_id": nested.to_string() },
            "exp": valid_exp(),
        }));

        let claims = decoder().decode(&token).unwrap();
        assert_eq!(claims.tenant_id, Some(top));
    }

    #[test]
    fn missing_tenant_claim_is_not_an_error() {
        let token = mint(json!({
            "sub": PrincipalId::new().to_string(),
            "exp": valid_exp(),
        }));

        let claims = decoder().decode(&token).unwrap();
        assert_eq!(claims.tenant_id, None);
        assert!(claims.principal_id.is_some());
    }

    #[test]
    fn unparseable_tenant_value_falls_through_to_next_key() {
        let tenant = TenantId::new();
        let token = mint(json!({
            "sub": PrincipalId::new().to_string(),
            "tenant_id": "not-a-uuid",
            "empresa_id": tenant.to_string(),
            "exp": valid_exp(),
        }));

        let claims = decoder().decode(&token).unwrap();
        assert_eq!(claims.tenant_id, Some(tenant));
    }

    #[test]
    fn rejects_token_signed_with_wrong_key() {
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": PrincipalId::new().to_string(), "exp": valid_exp() }),
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .unwrap();

        let result = decoder().decode(&token);
        assert_eq!(result, Err(ClaimsError::InvalidSignature));
    }

    #[test]
    fn rejects_expired_token() {
        let token = mint(json!({
            "sub": PrincipalId::new().to_string(),
            "exp": (Utc::now() - chrono::Duration::hours(2)).timestamp(),
        }));

        let result = decoder().decode(&token);
        assert_eq!(result, Err(ClaimsError::Expired));
    }

    #[test]
    fn rejects_garbage_input() {
        let result = decoder().decode("definitely.not.a-token");
        assert_eq!(result, Err(ClaimsError::Malformed));
    }

    #[test]
    fn reads_roles_array_and_single_role_claim() {
        let token = mint(json!({
            "sub": PrincipalId::new().to_string(),
            "roles": ["admin", "accountant"],
            "exp": valid_exp(),
        }));
        let claims = decoder().decode(&token).unwrap();
        assert_eq!(claims.roles.len(), 2);
        assert!(claims.roles[0].is_admin());

        let token = mint(json!({
            "sub": PrincipalId::new().to_string(),
            "role": "user",
            "exp": valid_exp(),
        }));
        let claims = decoder().decode(&token).unwrap();
        assert_eq!(claims.roles, vec![Role::new("user")]);
    }
}
