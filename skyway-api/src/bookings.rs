use axum::{
    extract::{Extension, Path, Query, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use skyway_booking::ETicket;
use skyway_core::booking::{Booking, BookingDetail};
use skyway_shared::models::events::{BookingEvent, BookingEventKind};
use skyway_store::AccessClaims;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", get(list_bookings))
        .route("/v1/bookings/{pnr}", get(get_booking))
        .route("/v1/bookings/{pnr}/ticket", get(get_ticket))
        .route("/v1/bookings/{pnr}/stream", get(stream_booking))
        .route("/v1/bookings/{pnr}/cancel", post(cancel_booking))
}

#[derive(Debug, Deserialize)]
pub struct TicketParams {
    /// `text` for the printable rendering, JSON otherwise.
    pub format: Option<String>,
}

async fn owned_detail(state: &AppState, pnr: &str, claims: &AccessClaims) -> Result<BookingDetail, AppError> {
    let detail = state.checkout.detail(pnr).await?;
    if !detail.booking.is_owned_by(&claims.sub) {
        return Err(AppError::AuthorizationError(
            "Unauthorized: Booking does not belong to you".to_string(),
        ));
    }
    Ok(detail)
}

/// GET /v1/bookings
/// The caller's bookings, newest first.
async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state.repos.bookings.list_for_user(&claims.sub).await?;
    Ok(Json(bookings))
}

/// GET /v1/bookings/{pnr}
async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(pnr): Path<String>,
) -> Result<Json<BookingDetail>, AppError> {
    Ok(Json(owned_detail(&state, &pnr, &claims).await?))
}

/// GET /v1/bookings/{pnr}/ticket
async fn get_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(pnr): Path<String>,
    Query(params): Query<TicketParams>,
) -> Result<Response, AppError> {
    let detail = owned_detail(&state, &pnr, &claims).await?;
    let ticket = ETicket::from_detail(&detail, Utc::now())?;

    if params.format.as_deref() == Some("text") {
        return Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            ticket.render_text(),
        )
            .into_response());
    }
    Ok(Json(ticket).into_response())
}

/// GET /v1/bookings/{pnr}/stream
/// Server-sent status changes for one booking. The first event is the
/// current status; the stream ends when the client disconnects.
async fn stream_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(pnr): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Subscribe before reading so no change slips in between
    let rx = state.sse_tx.subscribe();
    let booking = owned_detail(&state, &pnr, &claims).await?.booking;

    let snapshot = BookingEvent {
        booking_id: booking.id,
        pnr: booking.pnr.clone(),
        kind: BookingEventKind::StatusChanged,
        status: booking.status.to_string(),
        timestamp: Utc::now().timestamp(),
    };
    let initial = stream::iter(to_sse(&snapshot).map(Ok::<_, Infallible>));

    let pnr = booking.pnr;
    let updates = BroadcastStream::new(rx).filter_map(move |result| {
        let pnr = pnr.clone();
        async move {
            match result {
                Ok(event) if event.pnr == pnr => to_sse(&event).map(Ok::<_, Infallible>),
                Ok(_) => None,
                // Lagged receivers skip ahead
                Err(_) => None,
            }
        }
    });

    Ok(Sse::new(initial.chain(updates)).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &BookingEvent) -> Option<Event> {
    let data = serde_json::to_string(event).ok()?;
    Some(Event::default().event(event.kind.as_str()).data(data))
}

/// POST /v1/bookings/{pnr}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(pnr): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let detail = owned_detail(&state, &pnr, &claims).await?;
    let booking = state.checkout.cancel(&detail.booking.pnr, Utc::now()).await?;
    info!("Booking {} cancelled by {}", booking.pnr, claims.sub);
    Ok(Json(booking))
}
