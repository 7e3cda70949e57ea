use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use nimbuserp_auth::TokenDecoder;
use nimbuserp_tenancy::RequestContext;

use crate::context::{PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub decoder: Arc<TokenDecoder>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = state.decoder.decode(token).map_err(|e| {
        tracing::warn!(error = %e, "rejected bearer credential");
        StatusCode::UNAUTHORIZED
    })?;

    // A verified token without a subject is useless; a missing tenant claim
    // is allowed and stays unresolved (fail-closed downstream).
    let Some(principal_id) = claims.principal_id else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    req.extensions_mut()
        .insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut()
        .insert(PrincipalContext::new(principal_id, claims.roles.clone()));

    // The task-local context lives exactly as long as the request future:
    // it is popped on response, error, panic, and cancellation alike.
    let ctx = RequestContext::new(claims.tenant_id, Some(principal_id));
    Ok(nimbuserp_tenancy::scope(ctx, next.run(req)).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    #[test]
    fn extract_bearer_requires_the_scheme_prefix() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(AUTHORIZATION, "Bearer    ".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(AUTHORIZATION, "Bearer token-123".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Ok("token-123"));
    }
}
