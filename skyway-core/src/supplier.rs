use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use chrono::NaiveDate;

use crate::flight::Flight;
use crate::search::FlightSearchQuery;
use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Fallback,
}

/// Results from a third-party feed, tagged with where they came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveResults<T> {
    pub source: DataSource,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSearchQuery {
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Train {
    pub number: String,
    pub name: String,
    pub from_station: String,
    pub to_station: String,
    pub departure: String,
    pub arrival: String,
    pub duration_minutes: i32,
    pub runs_on: Vec<String>,
}

#[async_trait]
pub trait FlightDataProvider: Send + Sync {
    async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<Flight>, CoreError>;
}

#[async_trait]
pub trait TrainDataProvider: Send + Sync {
    async fn search(&self, query: &TrainSearchQuery) -> Result<Vec<Train>, CoreError>;
}
