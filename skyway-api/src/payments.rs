use axum::{
    extract::{Extension, Json, Path, State},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use skyway_core::booking::Booking;
use skyway_core::payment::{GatewayOrder, UpiRequest};
use skyway_core::session::SessionView;
use skyway_store::AccessClaims;

use crate::error::AppError;
use crate::sessions::{load_session, save_session, session_pnr};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/sessions/{id}/payment/order", post(create_order))
        .route("/v1/sessions/{id}/payment/verify", post(verify_payment))
        .route("/v1/sessions/{id}/upi", get(upi_instructions).post(submit_upi))
}

#[derive(Debug, Serialize)]
pub struct PaymentOrderResponse {
    /// Public key the checkout widget is opened with.
    pub key_id: String,
    pub pnr: String,
    pub order: GatewayOrder,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct UpiInstructions {
    pub pnr: String,
    pub vpa: String,
    pub payee_name: String,
    pub amount_minor: i64,
    pub currency: String,
    /// Rendered as a QR code by the client.
    pub deep_link: String,
}

#[derive(Debug, Deserialize)]
pub struct UpiSubmission {
    pub utr: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResult {
    pub booking: Booking,
    pub session: SessionView,
}

/// POST /v1/sessions/{id}/payment/order
async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentOrderResponse>, AppError> {
    let now = Utc::now();
    let session = load_session(&state, id, &claims).await?;
    if session.is_expired(now) {
        return Err(AppError::GoneError(format!("Booking session {} has expired", id)));
    }
    let pnr = session_pnr(&session)?;

    let order = state.checkout.start_payment(pnr, now).await?;

    Ok(Json(PaymentOrderResponse {
        key_id: state.checkout.gateway_key_id().to_string(),
        pnr: pnr.to_string(),
        order,
    }))
}

/// POST /v1/sessions/{id}/payment/verify
/// Completion callback from the checkout widget. Accepted after the countdown
/// ran out since the gateway has already captured the payment.
async fn verify_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<PaymentResult>, AppError> {
    let now = Utc::now();
    let mut session = load_session(&state, id, &claims).await?;
    let pnr = session_pnr(&session)?.to_string();

    let booking = state
        .checkout
        .confirm_gateway_payment(&pnr, &req.order_id, &req.payment_id, &req.signature, now)
        .await?;

    session.complete()?;
    save_session(&state, &session, now).await?;

    Ok(Json(PaymentResult {
        booking,
        session: session.view(now),
    }))
}

/// GET /v1/sessions/{id}/upi
/// Static-VPA payment details for the manual UPI path.
async fn upi_instructions(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<UpiInstructions>, AppError> {
    let now = Utc::now();
    let session = load_session(&state, id, &claims).await?;
    if session.is_expired(now) {
        return Err(AppError::GoneError(format!("Booking session {} has expired", id)));
    }
    let booking = state.checkout.detail(session_pnr(&session)?).await?.booking;

    let request = UpiRequest {
        vpa: state.config.upi.vpa.clone(),
        payee_name: state.config.upi.payee_name.clone(),
        amount_minor: booking.total_minor,
        currency: booking.currency.clone(),
        note: format!("Skyway booking {}", booking.pnr),
    };

    Ok(Json(UpiInstructions {
        deep_link: request.deep_link(),
        pnr: booking.pnr,
        vpa: request.vpa,
        payee_name: request.payee_name,
        amount_minor: request.amount_minor,
        currency: request.currency,
    }))
}

/// POST /v1/sessions/{id}/upi
/// The customer reports the UTR; an operator confirms it later.
async fn submit_upi(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpiSubmission>,
) -> Result<Json<PaymentResult>, AppError> {
    let now = Utc::now();
    let mut session = load_session(&state, id, &claims).await?;
    if session.is_expired(now) {
        return Err(AppError::GoneError(format!("Booking session {} has expired", id)));
    }
    let pnr = session_pnr(&session)?.to_string();

    let booking = state.checkout.submit_upi(&pnr, &req.utr, now).await?;

    session.complete()?;
    save_session(&state, &session, now).await?;
    info!("UPI reference recorded for booking {}", booking.pnr);

    Ok(Json(PaymentResult {
        booking,
        session: session.view(now),
    }))
}
