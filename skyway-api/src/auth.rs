use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use skyway_core::identity::{validate_credentials, AuthSession, AuthUser};
use skyway_core::passenger::{validate_name, FieldError, ValidationErrors};
use skyway_core::profile::{generate_referral_code, Profile};
use skyway_core::repository::RepositoryError;
use skyway_shared::pii::mask_email;
use skyway_store::AccessClaims;

use crate::error::AppError;
use crate::middleware::is_admin;
use crate::state::AppState;

const REFERRAL_CODE_ATTEMPTS: usize = 3;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/signup", post(sign_up))
        .route("/v1/auth/signin", post(sign_in))
}

pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/signout", post(sign_out))
        .route("/v1/auth/session", get(current_session))
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    #[serde(flatten)]
    pub session: AuthSession,
    pub profile: Profile,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: AuthUser,
    pub is_admin: bool,
    pub expires_at: usize,
}

/// POST /v1/auth/signup
/// Creates the identity, then the profile row carrying the referral link.
async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), AppError> {
    // 1. Validate before anything reaches the provider
    if let Err(msg) = validate_name(&req.full_name) {
        return Err(ValidationErrors(vec![FieldError::new("full_name", msg)]).into());
    }
    validate_credentials(&req.email, &req.password)?;

    // 2. Resolve the referral code to the referrer's user id
    let referred_by = match req.referral_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let referrer = state
                .repos
                .profiles
                .get_by_referral_code(&code.to_ascii_uppercase())
                .await?
                .ok_or_else(|| AppError::ValidationError(format!("Unknown referral code: {}", code)))?;
            Some(referrer.id)
        }
        None => None,
    };

    // 3. Identity
    let session = state
        .auth_provider
        .sign_up(&req.email, &req.password, &req.full_name)
        .await?;

    // 4. Profile row, regenerating the code on the rare collision
    let mut profile = Profile::new(
        session.user.id.clone(),
        Some(session.user.email.clone()),
        req.full_name.trim(),
        referred_by,
    );
    let mut stored = None;
    for _ in 0..REFERRAL_CODE_ATTEMPTS {
        match state.repos.profiles.upsert(&profile).await {
            Ok(p) => {
                stored = Some(p);
                break;
            }
            Err(RepositoryError::Conflict(_)) => {
                profile.referral_code = generate_referral_code(&profile.full_name);
            }
            Err(e) => return Err(e.into()),
        }
    }
    let profile = stored.ok_or_else(|| AppError::InternalServerError("Could not allocate a referral code".to_string()))?;

    info!(
        "User {} signed up ({}){}",
        profile.id,
        mask_email(&session.user.email),
        if profile.referred_by.is_some() { " via referral" } else { "" }
    );

    Ok((StatusCode::CREATED, Json(SignUpResponse { session, profile })))
}

/// POST /v1/auth/signin
async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<AuthSession>, AppError> {
    let session = state.auth_provider.sign_in(&req.email, &req.password).await?;
    info!("User {} signed in", session.user.id);
    Ok(Json(session))
}

/// POST /v1/auth/signout
/// Best effort: the provider failing to revoke still ends the client session.
async fn sign_out(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> StatusCode {
    if let Err(e) = state.auth_provider.sign_out(bearer.token()).await {
        warn!("Sign-out for {} not confirmed by provider: {}", claims.sub, e);
    }
    StatusCode::NO_CONTENT
}

/// GET /v1/auth/session
/// Confirms the token with the provider and reports the caller's access level.
async fn current_session(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = state.auth_provider.get_user(bearer.token()).await?;
    if user.id != claims.sub {
        return Err(AppError::AuthenticationError("Token does not match the signed-in user".to_string()));
    }

    Ok(Json(SessionResponse {
        is_admin: is_admin(&claims, &state.config.auth),
        expires_at: claims.exp,
        user,
    }))
}
