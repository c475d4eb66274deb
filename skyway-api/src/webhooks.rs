use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;

use skyway_booking::CheckoutError;
use skyway_core::repository::RepositoryError;
use skyway_store::payment_gateway::parse_webhook;

use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// POST /v1/webhooks/payments
/// Server-to-server payment notifications. The PNR travels in the order notes.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    // 1. Authenticate the body
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if !state.gateway.verify_webhook(&body, signature) {
        tracing::warn!("Rejected payment webhook with bad signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    // 2. Extract the payment
    let notification = match parse_webhook(&body) {
        Ok(Some(n)) => n,
        Ok(None) => return Ok(StatusCode::OK),
        Err(e) => {
            tracing::warn!("Unreadable payment webhook: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };
    tracing::info!(
        "Received webhook: {} for order {}",
        notification.event,
        notification.order_id
    );

    let Some(pnr) = notification.pnr.as_deref() else {
        tracing::warn!("Webhook for order {} carries no PNR, ignoring", notification.order_id);
        return Ok(StatusCode::OK);
    };

    // 3. Apply via checkout
    match state
        .checkout
        .apply_gateway_webhook(
            pnr,
            &notification.order_id,
            &notification.payment_id,
            notification.captured,
            Utc::now(),
        )
        .await
    {
        Ok(booking) => {
            tracing::info!("Booking {} is {} after webhook", booking.pnr, booking.status);
            Ok(StatusCode::OK)
        }
        // Not ours or superseded; retrying will not help
        Err(
            e @ (CheckoutError::BookingNotFound(_)
            | CheckoutError::PaymentMismatch(_)
            | CheckoutError::Lifecycle(_)
            | CheckoutError::Repository(RepositoryError::Conflict(_))),
        ) => {
            tracing::warn!("Ignoring webhook for booking {}: {}", pnr, e);
            Ok(StatusCode::OK)
        }
        Err(e) => {
            tracing::error!("Failed to apply webhook for booking {}: {}", pnr, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
