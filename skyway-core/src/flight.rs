use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl std::str::FromStr for CabinClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "economy" => Ok(CabinClass::Economy),
            "premium_economy" => Ok(CabinClass::PremiumEconomy),
            "business" => Ok(CabinClass::Business),
            "first" => Ok(CabinClass::First),
            other => Err(format!("Unknown cabin class: {}", other)),
        }
    }
}

/// A row of the `flights` table. Prices are in minor currency units (paise).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: Uuid,
    pub airline: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub duration_minutes: i32,
    #[serde(default)]
    pub stops: i32,
    #[serde(default)]
    pub cabin_class: CabinClass,
    pub price_minor: i64,
    pub currency: String,
    pub seats_available: i32,
}

impl Flight {
    pub fn can_accommodate(&self, passengers: u32) -> bool {
        self.seats_available >= 0 && self.seats_available as u32 >= passengers
    }

    pub fn route(&self) -> String {
        format!("{}-{}", self.origin, self.destination)
    }
}

/// Copy of the flight stored on the booking row, so the booking keeps showing
/// what was sold even if the schedule or price changes later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightSnapshot {
    pub flight_id: Uuid,
    pub airline: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub cabin_class: CabinClass,
    pub price_minor: i64,
    pub currency: String,
}

impl From<&Flight> for FlightSnapshot {
    fn from(flight: &Flight) -> Self {
        Self {
            flight_id: flight.id,
            airline: flight.airline.clone(),
            flight_number: flight.flight_number.clone(),
            origin: flight.origin.clone(),
            destination: flight.destination.clone(),
            departure_time: flight.departure_time,
            arrival_time: flight.arrival_time,
            cabin_class: flight.cabin_class,
            price_minor: flight.price_minor,
            currency: flight.currency.clone(),
        }
    }
}
