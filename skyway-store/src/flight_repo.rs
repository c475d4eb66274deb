use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;
use uuid::Uuid;

use skyway_core::flight::Flight;
use skyway_core::repository::{FlightRepository, RepoResult, RepositoryError};
use skyway_core::search::FlightSearchQuery;

use crate::rest::DataClient;

const TABLE: &str = "flights";

pub struct RestFlightRepository {
    client: DataClient,
}

impl RestFlightRepository {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FlightRepository for RestFlightRepository {
    async fn search(&self, query: &FlightSearchQuery) -> RepoResult<Vec<Flight>> {
        // Departures on the requested calendar day (UTC)
        let day_start = query.date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        let Some(day_start) = day_start else {
            return Ok(Vec::new());
        };
        let day_end = day_start + Duration::days(1);

        let flights = self
            .client
            .from(TABLE)
            .eq("origin", &query.origin)
            .eq("destination", &query.destination)
            .gte("departure_time", day_start.to_rfc3339())
            .lt("departure_time", day_end.to_rfc3339())
            .gte("seats_available", query.passengers)
            .order("departure_time", true)
            .fetch()
            .await?;
        Ok(flights)
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Flight>> {
        Ok(self.client.from(TABLE).eq("id", id).fetch_optional().await?)
    }

    async fn adjust_seats(&self, id: Uuid, delta: i32) -> RepoResult<Flight> {
        // Done server-side so concurrent confirmations don't lose updates
        let rows: Vec<Flight> = self
            .client
            .rpc("adjust_flight_seats", &json!({ "flight_id": id, "delta": delta }))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RepositoryError::NotFound(format!("flight {}", id)))
    }
}
