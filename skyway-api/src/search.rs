use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use skyway_catalog::AncillaryProduct;
use skyway_core::flight::{CabinClass, Flight};
use skyway_core::search::{self, FlightFilter, FlightSearchQuery, SortKey};
use skyway_core::supplier::{LiveResults, Train, TrainSearchQuery};
use skyway_core::CoreError;
use skyway_store::flight_data::{fallback_flights, with_fallback, UNPRICED};
use skyway_store::train_data::fallback_trains;

use crate::error::AppError;
use crate::middleware::CircuitBreaker;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights", get(search_flights))
        .route("/v1/flights/live", get(search_live_flights))
        .route("/v1/flights/{id}", get(get_flight))
        .route("/v1/trains", get(search_trains))
        .route("/v1/ancillaries", get(list_ancillaries))
}

#[derive(Debug, Deserialize)]
pub struct FlightSearchParams {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    pub passengers: Option<u32>,
    pub sort: Option<String>,
    pub max_price: Option<i64>,
    /// Comma separated
    pub airlines: Option<String>,
    pub max_stops: Option<i32>,
    /// `HH:MM`
    pub depart_after: Option<String>,
    pub depart_before: Option<String>,
    pub cabin: Option<CabinClass>,
}

impl FlightSearchParams {
    fn query(&self) -> Result<FlightSearchQuery, CoreError> {
        FlightSearchQuery {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            date: self.date,
            passengers: self.passengers.unwrap_or(1),
        }
        .normalized()
    }

    fn filter(&self, passengers: u32) -> Result<FlightFilter, AppError> {
        Ok(FlightFilter {
            max_price_minor: self.max_price,
            airlines: self
                .airlines
                .as_deref()
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            max_stops: self.max_stops,
            depart_after: parse_time("depart_after", self.depart_after.as_deref())?,
            depart_before: parse_time("depart_before", self.depart_before.as_deref())?,
            cabin_class: self.cabin,
            min_seats: passengers,
        })
    }
}

fn parse_time(field: &str, value: Option<&str>) -> Result<Option<NaiveTime>, AppError> {
    value
        .map(|v| {
            NaiveTime::parse_from_str(v.trim(), "%H:%M")
                .map_err(|_| AppError::ValidationError(format!("{} must be HH:MM", field)))
        })
        .transpose()
}

#[derive(Debug, Serialize)]
pub struct FlightSearchResponse {
    pub count: usize,
    pub flights: Vec<Flight>,
}

/// GET /v1/flights
/// Scheduled flights from the datastore, narrowed and sorted.
async fn search_flights(
    State(state): State<AppState>,
    Query(params): Query<FlightSearchParams>,
) -> Result<Json<FlightSearchResponse>, AppError> {
    let query = params.query()?;
    let filter = params.filter(query.passengers)?;
    let sort = match params.sort.as_deref() {
        Some(key) => key.parse::<SortKey>().map_err(AppError::ValidationError)?,
        None => SortKey::default(),
    };

    let fetched = state.repos.flights.search(&query).await?;
    let flights = search::apply(fetched, &filter, sort);

    tracing::debug!(
        "Flight search {}-{} on {}: {} result(s)",
        query.origin,
        query.destination,
        query.date,
        flights.len()
    );
    Ok(Json(FlightSearchResponse {
        count: flights.len(),
        flights,
    }))
}

/// GET /v1/flights/{id}
async fn get_flight(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flight>, AppError> {
    state
        .repos
        .flights
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("Flight {} not found", id)))
}

/// Runs a live feed call through its breaker. An open breaker counts as a
/// failed call so the caller falls back without waiting on the feed.
async fn guarded<T, F>(cb: &CircuitBreaker, call: F) -> Result<Vec<T>, CoreError>
where
    F: std::future::Future<Output = Result<Vec<T>, CoreError>>,
{
    if !cb.check().await {
        return Err(CoreError::SupplierError(format!("Circuit Breaker [{}] is OPEN", cb.name)));
    }
    let result = call.await;
    match &result {
        Ok(_) => cb.record_success().await,
        Err(_) => cb.record_failure().await,
    }
    result
}

/// GET /v1/flights/live
/// Third-party schedules, informational only. Fares are estimated.
async fn search_live_flights(
    State(state): State<AppState>,
    Query(params): Query<FlightSearchParams>,
) -> Result<Json<LiveResults<Flight>>, AppError> {
    let query = params.query()?;

    let live = guarded(&state.resiliency.flight_feed_cb, state.flight_feed.search(&query)).await;
    let mut results = with_fallback("flight", live, || fallback_flights(&query));

    let pricing = state.checkout.pricing();
    for flight in results.items.iter_mut() {
        if flight.price_minor == UNPRICED {
            flight.price_minor = pricing.estimate_fare(flight.duration_minutes);
        }
    }
    results.items.sort_by_key(|f| f.departure_time);

    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct TrainSearchParams {
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
}

fn is_station_code(code: &str) -> bool {
    (2..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_uppercase())
}

/// GET /v1/trains
async fn search_trains(
    State(state): State<AppState>,
    Query(params): Query<TrainSearchParams>,
) -> Result<Json<LiveResults<Train>>, AppError> {
    let query = TrainSearchQuery {
        from: params.from.trim().to_ascii_uppercase(),
        to: params.to.trim().to_ascii_uppercase(),
        date: params.date,
    };
    if !is_station_code(&query.from) || !is_station_code(&query.to) {
        return Err(AppError::ValidationError("Station codes must be 2 to 5 letters".to_string()));
    }
    if query.from == query.to {
        return Err(AppError::ValidationError("Origin and destination must differ".to_string()));
    }

    let live = guarded(&state.resiliency.train_feed_cb, state.train_feed.search(&query)).await;
    Ok(Json(with_fallback("train", live, || fallback_trains(&query))))
}

/// GET /v1/ancillaries
async fn list_ancillaries(State(state): State<AppState>) -> Json<Vec<AncillaryProduct>> {
    Json(
        state
            .checkout
            .catalog()
            .products()
            .filter(|p| p.is_active)
            .cloned()
            .collect(),
    )
}
