use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use skyway_core::booking::{Booking, BookingStatus};
use skyway_core::passenger::Passenger;
use skyway_core::repository::{
    BookingFilter, BookingRepository, BookingSort, PassengerRepository, RepoResult, RepositoryError,
};

use crate::rest::{DataClient, Query};

pub struct RestBookingRepository {
    client: DataClient,
}

impl RestBookingRepository {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }
}

/// PostgREST reserves these inside `or=(...)` groups.
fn sanitize_search(needle: &str) -> String {
    needle
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '"' | '\\'))
        .collect()
}

#[async_trait]
impl BookingRepository for RestBookingRepository {
    async fn create(&self, booking: &Booking) -> RepoResult<Booking> {
        // Unique index on pnr turns a collision into a 409
        Ok(self.client.from("bookings").insert(booking).await?)
    }

    async fn get_by_pnr(&self, pnr: &str) -> RepoResult<Option<Booking>> {
        Ok(self.client.from("bookings").eq("pnr", pnr).fetch_optional().await?)
    }

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<Booking>> {
        Ok(self
            .client
            .from("bookings")
            .eq("user_id", user_id)
            .order("created_at", false)
            .fetch()
            .await?)
    }

    async fn list(&self, filter: &BookingFilter) -> RepoResult<Vec<Booking>> {
        let mut query = self.client.from("bookings");
        if let Some(status) = filter.status {
            query = query.eq("status", status);
        }
        if let Some(needle) = filter.search.as_deref().map(sanitize_search).filter(|s| !s.trim().is_empty()) {
            let needle = needle.trim();
            query = query.or(&format!("pnr.ilike.*{0}*,contact_email.ilike.*{0}*", needle));
        }
        query = match filter.sort {
            BookingSort::Newest => query.order("created_at", false),
            BookingSort::Oldest => query.order("created_at", true),
            BookingSort::AmountDesc => query.order("total_minor", false),
        };
        Ok(query.limit(filter.limit).fetch().await?)
    }

    async fn update(&self, booking: &Booking, expected: BookingStatus) -> RepoResult<Booking> {
        let patch = json!({
            "status": booking.status,
            "payment_method": booking.payment_method,
            "payment_order_id": booking.payment_order_id,
            "payment_id": booking.payment_id,
            "updated_at": booking.updated_at,
        });
        let rows: Vec<Booking> = status_guarded(&self.client, &booking.pnr, expected)
            .update(&patch)
            .await?;
        if let Some(row) = rows.into_iter().next() {
            return Ok(row);
        }

        // Nothing matched: either gone or another writer got there first
        match self.get_by_pnr(&booking.pnr).await? {
            Some(current) => Err(RepositoryError::Conflict(format!(
                "booking {} is {}, expected {}",
                booking.pnr, current.status, expected
            ))),
            None => Err(RepositoryError::NotFound(format!("booking {}", booking.pnr))),
        }
    }

    async fn delete(&self, id: Uuid) -> RepoResult<()> {
        Ok(self.client.from("bookings").eq("id", id).delete().await?)
    }
}

/// PATCH target matching the row only while it still has the status the
/// writer read.
fn status_guarded<'a>(client: &'a DataClient, pnr: &str, expected: BookingStatus) -> Query<'a> {
    client.from("bookings").eq("pnr", pnr).eq("status", expected)
}

fn passengers_of(client: &DataClient, booking_id: Uuid) -> Query<'_> {
    client
        .from("passengers")
        .eq("booking_id", booking_id)
        .order("seq", true)
}

pub struct RestPassengerRepository {
    client: DataClient,
}

impl RestPassengerRepository {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PassengerRepository for RestPassengerRepository {
    async fn create_many(&self, passengers: &[Passenger]) -> RepoResult<Vec<Passenger>> {
        Ok(self.client.from("passengers").insert_many(passengers).await?)
    }

    async fn list_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<Passenger>> {
        Ok(passengers_of(&self.client, booking_id).fetch().await?)
    }
}
