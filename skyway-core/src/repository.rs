use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::flight::Flight;
use crate::passenger::Passenger;
use crate::profile::Profile;
use crate::referral::{Referral, Withdrawal, WithdrawalStatus};
use crate::search::FlightSearchQuery;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Conflicting record: {0}")]
    Conflict(String),
    #[error("Datastore error: {0}")]
    Backend(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingSort {
    #[default]
    Newest,
    Oldest,
    AmountDesc,
}

/// Admin listing criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    /// Case-insensitive match on PNR or contact email.
    pub search: Option<String>,
    #[serde(default)]
    pub sort: BookingSort,
    pub limit: usize,
}

impl Default for BookingFilter {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            sort: BookingSort::Newest,
            limit: 50,
        }
    }
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        if let Some(status) = self.status {
            if booking.status != status {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_ascii_lowercase();
            let pnr = booking.pnr.to_ascii_lowercase();
            let email = booking.contact_email.expose().to_ascii_lowercase();
            if !pnr.contains(&needle) && !email.contains(&needle) {
                return false;
            }
        }
        true
    }

    pub fn sort(&self, bookings: &mut [Booking]) {
        match self.sort {
            BookingSort::Newest => bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            BookingSort::Oldest => bookings.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            BookingSort::AmountDesc => bookings.sort_by(|a, b| b.total_minor.cmp(&a.total_minor)),
        }
    }
}

#[async_trait]
pub trait FlightRepository: Send + Sync {
    async fn search(&self, query: &FlightSearchQuery) -> RepoResult<Vec<Flight>>;

    async fn get(&self, id: Uuid) -> RepoResult<Option<Flight>>;

    /// Adds `delta` (negative to sell) to the seat count and returns the row.
    async fn adjust_seats(&self, id: Uuid, delta: i32) -> RepoResult<Flight>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, booking: &Booking) -> RepoResult<Booking>;

    async fn get_by_pnr(&self, pnr: &str) -> RepoResult<Option<Booking>>;

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<Booking>>;

    async fn list(&self, filter: &BookingFilter) -> RepoResult<Vec<Booking>>;

    /// Writes status and payment fields back by PNR, provided the stored row
    /// is still in `expected`. A row that moved on meanwhile yields `Conflict`.
    async fn update(&self, booking: &Booking, expected: BookingStatus) -> RepoResult<Booking>;

    /// Removes a booking that never got its passenger rows.
    async fn delete(&self, id: Uuid) -> RepoResult<()>;
}

#[async_trait]
pub trait PassengerRepository: Send + Sync {
    async fn create_many(&self, passengers: &[Passenger]) -> RepoResult<Vec<Passenger>>;

    async fn list_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<Passenger>>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get(&self, user_id: &str) -> RepoResult<Option<Profile>>;

    async fn get_by_referral_code(&self, code: &str) -> RepoResult<Option<Profile>>;

    async fn upsert(&self, profile: &Profile) -> RepoResult<Profile>;
}

#[async_trait]
pub trait ReferralRepository: Send + Sync {
    async fn create(&self, referral: &Referral) -> RepoResult<Referral>;

    async fn list_for_referrer(&self, user_id: &str) -> RepoResult<Vec<Referral>>;

    async fn exists_for_referred(&self, referred_user_id: &str) -> RepoResult<bool>;
}

#[async_trait]
pub trait WithdrawalRepository: Send + Sync {
    async fn create(&self, withdrawal: &Withdrawal) -> RepoResult<Withdrawal>;

    async fn get(&self, id: Uuid) -> RepoResult<Option<Withdrawal>>;

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<Withdrawal>>;

    async fn list(&self, status: Option<WithdrawalStatus>) -> RepoResult<Vec<Withdrawal>>;

    async fn update(&self, withdrawal: &Withdrawal) -> RepoResult<Withdrawal>;
}
