use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::errors::ErrorKind;
use tracing::debug;

use skyway_store::app_config::AuthConfig;
use skyway_store::AccessClaims;

use crate::state::AppState;

// ============================================================================
// Token extraction
// ============================================================================

fn bearer_token(req: &Request) -> Result<&str, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)
}

fn decode_claims(state: &AppState, req: &Request) -> Result<AccessClaims, StatusCode> {
    let token = bearer_token(req)?;
    state.tokens.verify(token).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => debug!("Rejected expired access token"),
            ErrorKind::InvalidAudience => debug!("Rejected access token with wrong audience"),
            other => debug!("Rejected access token: {:?}", other),
        }
        StatusCode::UNAUTHORIZED
    })
}

/// Operators are either listed by email in config or carry the `admin`
/// role in the provider's app metadata.
pub fn is_admin(claims: &AccessClaims, auth: &AuthConfig) -> bool {
    claims.app_role() == Some("admin") || auth.is_admin_email(&claims.email)
}

// ============================================================================
// Customer Authentication Middleware
// ============================================================================

pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Decode and validate JWT
    let claims = decode_claims(&state, &req)?;

    // 2. Inject claims into request extensions
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Decode JWT
    let claims = decode_claims(&state, &req)?;

    // 2. Check operator access
    if !is_admin(&claims, &state.config.auth) {
        debug!("User {} denied admin access", claims.sub);
        return Err(StatusCode::FORBIDDEN);
    }

    // 3. Inject claims
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
