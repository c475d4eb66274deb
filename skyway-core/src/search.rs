use serde::{Deserialize, Serialize};
use chrono::{NaiveDate, NaiveTime, Timelike};

use crate::flight::{CabinClass, Flight};
use crate::passenger::MAX_PARTY_SIZE;
use crate::CoreError;

fn default_passengers() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightSearchQuery {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    #[serde(default = "default_passengers")]
    pub passengers: u32,
}

impl FlightSearchQuery {
    /// Upper-cases the airport codes and rejects queries the datastore would
    /// never match.
    pub fn normalized(mut self) -> Result<Self, CoreError> {
        self.origin = self.origin.trim().to_ascii_uppercase();
        self.destination = self.destination.trim().to_ascii_uppercase();

        if !is_iata_code(&self.origin) {
            return Err(CoreError::ValidationError(format!("Invalid origin airport code: {}", self.origin)));
        }
        if !is_iata_code(&self.destination) {
            return Err(CoreError::ValidationError(format!("Invalid destination airport code: {}", self.destination)));
        }
        if self.origin == self.destination {
            return Err(CoreError::ValidationError("Origin and destination must differ".to_string()));
        }
        if self.passengers == 0 || self.passengers as usize > MAX_PARTY_SIZE {
            return Err(CoreError::ValidationError(format!(
                "Passengers must be between 1 and {}",
                MAX_PARTY_SIZE
            )));
        }
        Ok(self)
    }
}

pub fn is_iata_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Narrowing criteria applied to an already fetched result list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightFilter {
    pub max_price_minor: Option<i64>,
    #[serde(default)]
    pub airlines: Vec<String>,
    pub max_stops: Option<i32>,
    pub depart_after: Option<NaiveTime>,
    pub depart_before: Option<NaiveTime>,
    pub cabin_class: Option<CabinClass>,
    #[serde(default)]
    pub min_seats: u32,
}

impl FlightFilter {
    pub fn matches(&self, flight: &Flight) -> bool {
        if let Some(max) = self.max_price_minor {
            if flight.price_minor > max {
                return false;
            }
        }
        if !self.airlines.is_empty()
            && !self.airlines.iter().any(|a| a.eq_ignore_ascii_case(&flight.airline))
        {
            return false;
        }
        if let Some(max_stops) = self.max_stops {
            if flight.stops > max_stops {
                return false;
            }
        }
        // Departure windows compare wall-clock time of day in UTC
        let departs = flight.departure_time.time();
        let departs = NaiveTime::from_hms_opt(departs.hour(), departs.minute(), 0).unwrap_or(departs);
        if let Some(after) = self.depart_after {
            if departs < after {
                return false;
            }
        }
        if let Some(before) = self.depart_before {
            if departs > before {
                return false;
            }
        }
        if let Some(cabin) = self.cabin_class {
            if flight.cabin_class != cabin {
                return false;
            }
        }
        flight.can_accommodate(self.min_seats)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    PriceAsc,
    PriceDesc,
    DurationAsc,
    DepartureAsc,
    ArrivalAsc,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price" | "price_asc" => Ok(SortKey::PriceAsc),
            "-price" | "price_desc" => Ok(SortKey::PriceDesc),
            "duration" => Ok(SortKey::DurationAsc),
            "departure" => Ok(SortKey::DepartureAsc),
            "arrival" => Ok(SortKey::ArrivalAsc),
            other => Err(format!("Unknown sort key: {}", other)),
        }
    }
}

/// Filter, then stable-sort. Ties keep the order the datastore returned.
pub fn apply(flights: Vec<Flight>, filter: &FlightFilter, sort: SortKey) -> Vec<Flight> {
    let mut results: Vec<Flight> = flights.into_iter().filter(|f| filter.matches(f)).collect();

    match sort {
        SortKey::PriceAsc => results.sort_by_key(|f| f.price_minor),
        SortKey::PriceDesc => results.sort_by_key(|f| std::cmp::Reverse(f.price_minor)),
        SortKey::DurationAsc => results.sort_by_key(|f| f.duration_minutes),
        SortKey::DepartureAsc => results.sort_by_key(|f| f.departure_time),
        SortKey::ArrivalAsc => results.sort_by_key(|f| f.arrival_time),
    }

    results
}
