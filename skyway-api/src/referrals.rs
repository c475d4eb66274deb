use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use skyway_core::referral::{validate_withdrawal, Ledger, Referral, Withdrawal};
use skyway_store::AccessClaims;

use crate::error::AppError;
use crate::profile::load_or_create;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/referrals", get(get_referrals))
        .route("/v1/referrals/withdrawals", post(request_withdrawal))
}

#[derive(Debug, Serialize)]
pub struct ReferralOverview {
    pub referral_code: String,
    pub ledger: Ledger,
    pub min_withdrawal_minor: i64,
    pub referrals: Vec<Referral>,
    pub withdrawals: Vec<Withdrawal>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount_minor: i64,
    pub upi_id: String,
}

async fn ledger_for(state: &AppState, user_id: &str) -> Result<(Vec<Referral>, Vec<Withdrawal>, Ledger), AppError> {
    let referrals = state.repos.referrals.list_for_referrer(user_id).await?;
    let withdrawals = state.repos.withdrawals.list_for_user(user_id).await?;
    let ledger = Ledger::new(&referrals, &withdrawals);
    Ok((referrals, withdrawals, ledger))
}

/// GET /v1/referrals
/// Referral code, earnings and payout history.
async fn get_referrals(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<Json<ReferralOverview>, AppError> {
    let profile = load_or_create(&state, &claims).await?;
    let (referrals, withdrawals, ledger) = ledger_for(&state, &claims.sub).await?;

    Ok(Json(ReferralOverview {
        referral_code: profile.referral_code,
        ledger,
        min_withdrawal_minor: state.config.business_rules.min_withdrawal_minor,
        referrals,
        withdrawals,
    }))
}

/// POST /v1/referrals/withdrawals
/// Queues a payout of referral earnings to a UPI id for operator approval.
async fn request_withdrawal(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<Withdrawal>), AppError> {
    let upi_id = req.upi_id.trim().to_ascii_lowercase();

    // Balance check and insert happen under the user's lock
    let _guard = state.withdrawal_locks.lock(&claims.sub).await;
    let (_, _, ledger) = ledger_for(&state, &claims.sub).await?;

    validate_withdrawal(
        &ledger,
        req.amount_minor,
        &upi_id,
        state.config.business_rules.min_withdrawal_minor,
    )?;

    let withdrawal = state
        .repos
        .withdrawals
        .create(&Withdrawal::new(claims.sub.clone(), req.amount_minor, upi_id))
        .await?;

    info!(
        "Withdrawal {} of {} requested by {}",
        withdrawal.id, withdrawal.amount_minor, claims.sub
    );
    Ok((StatusCode::CREATED, Json(withdrawal)))
}
