use axum::{
    extract::{Extension, Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use skyway_core::booking::{Booking, BookingDetail, BookingStatus};
use skyway_core::referral::{Withdrawal, WithdrawalStatus};
use skyway_core::repository::{BookingFilter, BookingSort};
use skyway_store::AccessClaims;

use crate::error::AppError;
use crate::state::AppState;

const MAX_LIST_LIMIT: usize = 200;
const SUMMARY_SCAN_LIMIT: usize = 10_000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/bookings", get(list_bookings))
        .route("/v1/admin/bookings/{pnr}", get(get_booking))
        .route("/v1/admin/bookings/{pnr}/upi-review", post(review_upi))
        .route("/v1/admin/withdrawals", get(list_withdrawals))
        .route("/v1/admin/withdrawals/{id}/decision", post(decide_withdrawal))
        .route("/v1/admin/summary", get(summary))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    pub status: Option<String>,
    /// Matches PNR or contact email.
    pub search: Option<String>,
    pub sort: Option<BookingSort>,
    pub limit: Option<usize>,
}

impl ListBookingsQuery {
    fn into_filter(self) -> Result<BookingFilter, AppError> {
        let status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
            .map(str::parse::<BookingStatus>)
            .transpose()
            .map_err(AppError::ValidationError)?;

        let defaults = BookingFilter::default();
        Ok(BookingFilter {
            status,
            search: self.search.filter(|s| !s.trim().is_empty()),
            sort: self.sort.unwrap_or(defaults.sort),
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_LIST_LIMIT),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub approve: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListWithdrawalsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub approve: bool,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct AdminSummary {
    pub bookings_by_status: BTreeMap<String, usize>,
    pub confirmed_revenue_minor: i64,
    pub awaiting_verification: usize,
    pub pending_withdrawals: usize,
    pub pending_withdrawal_minor: i64,
}

// ============================================================================
// Booking Handlers
// ============================================================================

/// GET /v1/admin/bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let filter = query.into_filter()?;
    let bookings = state.repos.bookings.list(&filter).await?;
    Ok(Json(bookings))
}

/// GET /v1/admin/bookings/{pnr}
pub async fn get_booking(
    State(state): State<AppState>,
    Path(pnr): Path<String>,
) -> Result<Json<BookingDetail>, AppError> {
    Ok(Json(state.checkout.detail(&pnr).await?))
}

/// POST /v1/admin/bookings/{pnr}/upi-review
/// Confirms or rejects a customer-reported UPI payment.
pub async fn review_upi(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(pnr): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.checkout.review_upi(&pnr, req.approve, Utc::now()).await?;
    info!(
        "UPI payment for {} {} by {}",
        booking.pnr,
        if req.approve { "approved" } else { "rejected" },
        claims.sub
    );
    Ok(Json(booking))
}

// ============================================================================
// Withdrawal Handlers
// ============================================================================

/// GET /v1/admin/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Query(query): Query<ListWithdrawalsQuery>,
) -> Result<Json<Vec<Withdrawal>>, AppError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        .map(str::parse::<WithdrawalStatus>)
        .transpose()
        .map_err(AppError::ValidationError)?;
    Ok(Json(state.repos.withdrawals.list(status).await?))
}

/// POST /v1/admin/withdrawals/{id}/decision
pub async fn decide_withdrawal(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<Withdrawal>, AppError> {
    let mut withdrawal = state
        .repos
        .withdrawals
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Withdrawal {} not found", id)))?;

    let note = req.note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    withdrawal.decide(req.approve, note, Utc::now())?;
    let withdrawal = state.repos.withdrawals.update(&withdrawal).await?;

    info!("Withdrawal {} {} by {}", withdrawal.id, withdrawal.status, claims.sub);
    Ok(Json(withdrawal))
}

// ============================================================================
// Dashboard
// ============================================================================

/// GET /v1/admin/summary
/// Counts and revenue are computed over at most `SUMMARY_SCAN_LIMIT` rows per
/// status; a status at the cap is logged and its figures are lower bounds.
pub async fn summary(State(state): State<AppState>) -> Result<Json<AdminSummary>, AppError> {
    let mut out = AdminSummary::default();

    for status in BookingStatus::all() {
        let filter = BookingFilter {
            status: Some(status),
            limit: SUMMARY_SCAN_LIMIT,
            ..BookingFilter::default()
        };
        let bookings = state.repos.bookings.list(&filter).await?;
        if bookings.len() >= SUMMARY_SCAN_LIMIT {
            warn!("Summary for {} truncated at {} bookings", status, SUMMARY_SCAN_LIMIT);
        }

        match status {
            BookingStatus::Confirmed => {
                out.confirmed_revenue_minor = bookings.iter().map(|b| b.total_minor).sum();
            }
            BookingStatus::AwaitingVerification => out.awaiting_verification = bookings.len(),
            _ => {}
        }
        out.bookings_by_status.insert(status.to_string(), bookings.len());
    }

    let pending = state.repos.withdrawals.list(Some(WithdrawalStatus::Pending)).await?;
    out.pending_withdrawals = pending.len();
    out.pending_withdrawal_minor = pending.iter().map(|w| w.amount_minor).sum();

    Ok(Json(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_builds_filter() {
        let query = ListBookingsQuery {
            status: Some("awaiting_verification".to_string()),
            search: Some("  ".to_string()),
            sort: Some(BookingSort::AmountDesc),
            limit: Some(5_000),
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.status, Some(BookingStatus::AwaitingVerification));
        assert!(filter.search.is_none());
        assert_eq!(filter.sort, BookingSort::AmountDesc);
        assert_eq!(filter.limit, MAX_LIST_LIMIT);
    }

    #[test]
    fn test_all_means_no_status_filter() {
        let query = ListBookingsQuery {
            status: Some("ALL".to_string()),
            search: None,
            sort: None,
            limit: None,
        };
        let filter = query.into_filter().unwrap();
        assert!(filter.status.is_none());
        assert_eq!(filter.limit, 50);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let query = ListBookingsQuery {
            status: Some("SHIPPED".to_string()),
            search: None,
            sort: None,
            limit: None,
        };
        assert!(matches!(query.into_filter(), Err(AppError::ValidationError(_))));
    }
}
