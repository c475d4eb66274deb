use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use skyway_booking::NewBooking;
use skyway_catalog::inventory;
use skyway_core::booking::BookingDetail;
use skyway_core::passenger::MAX_PARTY_SIZE;
use skyway_core::session::{BookingSession, SessionView};
use skyway_store::AccessClaims;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/{id}", get(get_session))
        .route("/v1/sessions/{id}/passengers", post(submit_passengers))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub flight_id: Uuid,
    pub passengers: u32,
}

#[derive(Debug, Serialize)]
pub struct PassengersResponse {
    pub session: SessionView,
    #[serde(flatten)]
    pub detail: BookingDetail,
}

/// Loads a session the caller owns.
pub(crate) async fn load_session(state: &AppState, id: Uuid, claims: &AccessClaims) -> Result<BookingSession, AppError> {
    let session = state
        .sessions
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Booking session {} not found", id)))?;

    if session.user_id != claims.sub {
        return Err(AppError::AuthorizationError(
            "Unauthorized: Session does not belong to you".to_string(),
        ));
    }
    Ok(session)
}

pub(crate) async fn save_session(state: &AppState, session: &BookingSession, now: DateTime<Utc>) -> Result<(), AppError> {
    state.sessions.put(session, session.storage_ttl_seconds(now)).await?;
    Ok(())
}

/// The PNR created at the passenger step; payment routes need one.
pub(crate) fn session_pnr(session: &BookingSession) -> Result<&str, AppError> {
    session
        .booking_pnr
        .as_deref()
        .ok_or_else(|| AppError::ConflictError("Passenger details have not been submitted".to_string()))
}

/// POST /v1/sessions
/// Starts the booking countdown for one flight.
async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let now = Utc::now();

    // 1. Party size
    if req.passengers == 0 || req.passengers as usize > MAX_PARTY_SIZE {
        return Err(AppError::ValidationError(format!(
            "Passengers must be between 1 and {}",
            MAX_PARTY_SIZE
        )));
    }

    // 2. Flight is bookable
    let flight = state
        .repos
        .flights
        .get(req.flight_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Flight {} not found", req.flight_id)))?;
    if flight.departure_time <= now {
        return Err(AppError::ValidationError("Flight has already departed".to_string()));
    }
    inventory::check_availability(flight.seats_available, req.passengers)
        .map_err(|e| AppError::ConflictError(e.to_string()))?;

    // 3. Countdown
    let session = BookingSession::start(
        claims.sub.clone(),
        flight.id,
        req.passengers,
        state.config.business_rules.booking_window_seconds,
        now,
    );
    save_session(&state, &session, now).await?;

    info!(
        "Session {} started for {} on {} ({} pax)",
        session.id, claims.sub, flight.flight_number, req.passengers
    );
    Ok((StatusCode::CREATED, Json(session.view(now))))
}

/// GET /v1/sessions/{id}
/// Current step and seconds left; polled by the countdown display.
async fn get_session(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = load_session(&state, id, &claims).await?;
    Ok(Json(session.view(Utc::now())))
}

/// POST /v1/sessions/{id}/passengers
/// Passenger step: creates the pending booking and moves on to payment.
async fn submit_passengers(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<PassengersResponse>), AppError> {
    let now = Utc::now();
    let mut session = load_session(&state, id, &claims).await?;

    if session.is_expired(now) {
        return Err(AppError::GoneError(format!("Booking session {} has expired", id)));
    }
    if let Some(pnr) = &session.booking_pnr {
        return Err(AppError::ConflictError(format!(
            "Passenger details already submitted for booking {}",
            pnr
        )));
    }

    let detail = state.checkout.create_booking(&mut session, req, now).await?;
    save_session(&state, &session, now).await?;

    Ok((
        StatusCode::CREATED,
        Json(PassengersResponse {
            session: session.view(now),
            detail,
        }),
    ))
}
