use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use skyway_shared::pii::Masked;

use crate::flight::FlightSnapshot;
use crate::passenger::Passenger;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    AwaitingVerification,
    Confirmed,
    PaymentFailed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::AwaitingVerification => "AWAITING_VERIFICATION",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::PaymentFailed => "PAYMENT_FAILED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn all() -> [BookingStatus; 5] {
        [
            BookingStatus::Pending,
            BookingStatus::AwaitingVerification,
            BookingStatus::Confirmed,
            BookingStatus::PaymentFailed,
            BookingStatus::Cancelled,
        ]
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::all()
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown booking status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Gateway,
    Upi,
}

/// Ancillary service attached to one passenger of a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookedAncillary {
    pub code: String,
    pub name: String,
    pub passenger_index: u32,
    pub price_minor: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FareBreakdown {
    pub base_fare_minor: i64,
    pub taxes_minor: i64,
    pub convenience_fee_minor: i64,
    pub ancillaries_minor: i64,
    pub total_minor: i64,
}

/// A row of the `bookings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub pnr: String,
    pub user_id: String,
    pub flight: FlightSnapshot,
    pub passenger_count: i32,
    pub status: BookingStatus,
    pub fare: FareBreakdown,
    pub total_minor: i64,
    pub currency: String,
    #[serde(default)]
    pub ancillaries: Vec<BookedAncillary>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub contact_email: Masked<String>,
    pub contact_phone: Masked<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDetail {
    pub booking: Booking,
    pub passengers: Vec<Passenger>,
}
