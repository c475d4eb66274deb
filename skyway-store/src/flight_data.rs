//! Live flight schedules from a third-party feed, with static fallback data.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use skyway_core::flight::{CabinClass, Flight};
use skyway_core::search::FlightSearchQuery;
use skyway_core::supplier::{DataSource, FlightDataProvider, LiveResults};
use skyway_core::CoreError;

use crate::app_config::FeedConfig;
use crate::error::StoreError;

/// Live results carry no fare or inventory; the API fills in an estimate.
pub const UNPRICED: i64 = 0;

/// Collapses a live call into tagged results: any error, or an empty
/// answer, is replaced by `fallback()`.
pub fn with_fallback<T>(feed: &str, live: Result<Vec<T>, CoreError>, fallback: impl FnOnce() -> Vec<T>) -> LiveResults<T> {
    match live {
        Ok(items) if !items.is_empty() => LiveResults { source: DataSource::Live, items },
        Ok(_) => {
            warn!("{} feed returned no results, serving fallback data", feed);
            LiveResults { source: DataSource::Fallback, items: fallback() }
        }
        Err(e) => {
            warn!("{} feed failed ({}), serving fallback data", feed, e);
            LiveResults { source: DataSource::Fallback, items: fallback() }
        }
    }
}

/// AviationStack-style `/v1/flights` client.
pub struct HttpFlightDataProvider {
    http: Client,
    base_url: String,
    access_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    data: Vec<FeedFlight>,
}

#[derive(Debug, Deserialize)]
struct FeedFlight {
    departure: FeedEndpoint,
    arrival: FeedEndpoint,
    airline: FeedAirline,
    flight: FeedNumber,
}

#[derive(Debug, Deserialize)]
struct FeedEndpoint {
    iata: Option<String>,
    scheduled: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FeedAirline {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedNumber {
    iata: Option<String>,
    number: Option<String>,
}

impl HttpFlightDataProvider {
    pub fn new(config: &FeedConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl FlightDataProvider for HttpFlightDataProvider {
    async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<Flight>, CoreError> {
        let Some(key) = &self.access_key else {
            return Err(CoreError::SupplierError("flight feed is not configured".to_string()));
        };

        let date = query.date.format("%Y-%m-%d").to_string();
        debug!("Live flight lookup {}-{} on {}", query.origin, query.destination, date);
        let resp = self
            .http
            .get(format!("{}/v1/flights", self.base_url))
            .query(&[
                ("access_key", key.as_str()),
                ("dep_iata", query.origin.as_str()),
                ("arr_iata", query.destination.as_str()),
                ("flight_date", date.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CoreError::SupplierError(StoreError::from(e).to_string()))?;

        if !resp.status().is_success() {
            return Err(CoreError::SupplierError(format!("flight feed returned {}", resp.status())));
        }
        let body: FeedResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::SupplierError(StoreError::from(e).to_string()))?;

        Ok(body.data.into_iter().filter_map(into_flight).collect())
    }
}

fn into_flight(f: FeedFlight) -> Option<Flight> {
    let departure_time = f.departure.scheduled?;
    let arrival_time = f.arrival.scheduled?;
    let duration_minutes = (arrival_time - departure_time).num_minutes() as i32;
    if duration_minutes <= 0 {
        return None;
    }

    Some(Flight {
        id: Uuid::new_v4(),
        airline: f.airline.name.unwrap_or_else(|| "Unknown airline".to_string()),
        flight_number: f.flight.iata.or(f.flight.number)?,
        origin: f.departure.iata?,
        destination: f.arrival.iata?,
        departure_time,
        arrival_time,
        duration_minutes,
        stops: 0,
        cabin_class: CabinClass::Economy,
        price_minor: UNPRICED,
        currency: "INR".to_string(),
        seats_available: 0,
    })
}

/// Carrier, flight number prefix, departure (HH:MM UTC), base fare.
const FALLBACK_SCHEDULE: [(&str, &str, (u32, u32), i64); 6] = [
    ("IndiGo", "6E", (0, 40), 489_900),
    ("Air India", "AI", (3, 15), 612_500),
    ("Vistara", "UK", (5, 55), 701_000),
    ("SpiceJet", "SG", (8, 30), 455_000),
    ("Akasa Air", "QP", (11, 45), 472_500),
    ("IndiGo", "6E", (15, 20), 539_900),
];

/// Placeholder schedule for a route and day: six departures through the day
/// with a fixed block time.
pub fn fallback_flights(query: &FlightSearchQuery) -> Vec<Flight> {
    let block_minutes = block_time(&query.origin, &query.destination);

    FALLBACK_SCHEDULE
        .iter()
        .enumerate()
        .filter_map(|(i, (airline, prefix, (h, m), fare))| {
            let departs = NaiveTime::from_hms_opt(*h, *m, 0)?;
            let departure_time = query.date.and_time(departs).and_utc();
            Some(Flight {
                id: Uuid::new_v4(),
                airline: airline.to_string(),
                flight_number: format!("{}-{}", prefix, 201 + i * 112),
                origin: query.origin.clone(),
                destination: query.destination.clone(),
                departure_time,
                arrival_time: departure_time + chrono::Duration::minutes(block_minutes as i64 + (i as i64 % 3) * 10),
                duration_minutes: block_minutes + (i as i32 % 3) * 10,
                stops: if i == 4 { 1 } else { 0 },
                cabin_class: CabinClass::Economy,
                price_minor: *fare,
                currency: "INR".to_string(),
                seats_available: 18 + (i as i32 * 7) % 40,
            })
        })
        .collect()
}

// Stable per-route block time between 65 and 185 minutes
fn block_time(origin: &str, destination: &str) -> i32 {
    let mut pair = [origin, destination];
    pair.sort();
    let seed: u32 = pair.concat().bytes().map(u32::from).sum();
    65 + (seed % 13) as i32 * 10
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn query() -> FlightSearchQuery {
        FlightSearchQuery {
            origin: "DEL".to_string(),
            destination: "BOM".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            passengers: 1,
        }
    }

    #[test]
    fn test_fallback_matches_route_and_day() {
        let flights = fallback_flights(&query());
        assert_eq!(flights.len(), FALLBACK_SCHEDULE.len());
        for f in &flights {
            assert_eq!(f.route(), "DEL-BOM");
            assert_eq!(f.departure_time.date_naive(), query().date);
            assert!(f.arrival_time > f.departure_time);
            assert!(f.price_minor > 0);
        }
    }

    #[test]
    fn test_block_time_is_symmetric() {
        assert_eq!(block_time("DEL", "BOM"), block_time("BOM", "DEL"));
        let t = block_time("BLR", "GOI");
        assert!((65..=185).contains(&t));
    }

    #[test]
    fn test_with_fallback() {
        let live = with_fallback("flight", Ok(vec![1, 2]), || vec![9]);
        assert_eq!(live.source, DataSource::Live);
        assert_eq!(live.items, vec![1, 2]);

        let failed = with_fallback("flight", Err(CoreError::SupplierError("down".into())), || vec![9]);
        assert_eq!(failed.source, DataSource::Fallback);
        assert_eq!(failed.items, vec![9]);

        let empty: LiveResults<i32> = with_fallback("flight", Ok(vec![]), || vec![9]);
        assert_eq!(empty.source, DataSource::Fallback);
    }

    #[test]
    fn test_feed_rows_without_times_are_dropped() {
        let body: FeedResponse = serde_json::from_str(
            r#"{"data":[
                {"departure":{"iata":"DEL","scheduled":"2026-11-02T04:10:00+00:00"},
                 "arrival":{"iata":"BOM","scheduled":"2026-11-02T06:20:00+00:00"},
                 "airline":{"name":"IndiGo"},"flight":{"iata":"6E2131","number":"2131"}},
                {"departure":{"iata":"DEL","scheduled":null},
                 "arrival":{"iata":"BOM","scheduled":null},
                 "airline":{"name":"IndiGo"},"flight":{"iata":"6E5001","number":"5001"}}
            ]}"#,
        )
        .unwrap();
        let flights: Vec<Flight> = body.data.into_iter().filter_map(into_flight).collect();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].flight_number, "6E2131");
        assert_eq!(flights[0].duration_minutes, 130);
        assert_eq!(flights[0].price_minor, UNPRICED);
    }
}
