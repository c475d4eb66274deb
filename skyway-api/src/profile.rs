use axum::{
    extract::{Extension, Json, State},
    routing::get,
    Router,
};

use skyway_core::profile::{Profile, ProfileUpdate};
use skyway_store::AccessClaims;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/profile", get(get_profile).put(update_profile))
}

/// Profile row for the caller. Accounts created directly on the identity
/// service get their row on first visit.
pub(crate) async fn load_or_create(state: &AppState, claims: &AccessClaims) -> Result<Profile, AppError> {
    if let Some(profile) = state.repos.profiles.get(&claims.sub).await? {
        return Ok(profile);
    }

    let full_name = claims
        .full_name()
        .map(str::to_string)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| claims.email.split('@').next().unwrap_or_default().to_string());
    let email = Some(claims.email.clone()).filter(|e| !e.is_empty());

    let profile = state
        .repos
        .profiles
        .upsert(&Profile::new(claims.sub.clone(), email, full_name, None))
        .await?;
    tracing::info!("Created missing profile for {}", claims.sub);
    Ok(profile)
}

/// GET /v1/profile
async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(load_or_create(&state, &claims).await?))
}

/// PUT /v1/profile
async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, AppError> {
    let mut profile = load_or_create(&state, &claims).await?;
    profile.apply(update)?;
    let profile = state.repos.profiles.upsert(&profile).await?;
    Ok(Json(profile))
}
