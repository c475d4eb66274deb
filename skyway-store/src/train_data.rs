use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use skyway_core::supplier::{Train, TrainDataProvider, TrainSearchQuery};
use skyway_core::CoreError;

use crate::app_config::FeedConfig;
use crate::error::StoreError;

/// Trains-between-stations lookup on a hosted rail API.
pub struct HttpTrainDataProvider {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    data: Vec<FeedTrain>,
}

#[derive(Debug, Deserialize)]
struct FeedTrain {
    train_number: String,
    train_name: String,
    from_station_name: String,
    to_station_name: String,
    from_std: String,
    to_sta: String,
    /// `HH:MM`
    duration: String,
    #[serde(default)]
    run_days: Vec<String>,
}

impl From<FeedTrain> for Train {
    fn from(t: FeedTrain) -> Self {
        Train {
            duration_minutes: parse_duration(&t.duration).unwrap_or(0),
            number: t.train_number,
            name: t.train_name,
            from_station: t.from_station_name,
            to_station: t.to_station_name,
            departure: t.from_std,
            arrival: t.to_sta,
            runs_on: t.run_days,
        }
    }
}

impl HttpTrainDataProvider {
    pub fn new(config: &FeedConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl TrainDataProvider for HttpTrainDataProvider {
    async fn search(&self, query: &TrainSearchQuery) -> Result<Vec<Train>, CoreError> {
        let Some(key) = &self.api_key else {
            return Err(CoreError::SupplierError("train feed is not configured".to_string()));
        };

        let date = query.date.format("%Y-%m-%d").to_string();
        debug!("Live train lookup {}-{} on {}", query.from, query.to, date);
        let resp = self
            .http
            .get(format!("{}/api/v3/trainBetweenStations", self.base_url))
            .header("x-api-key", key)
            .query(&[
                ("fromStationCode", query.from.as_str()),
                ("toStationCode", query.to.as_str()),
                ("dateOfJourney", date.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CoreError::SupplierError(StoreError::from(e).to_string()))?;

        if !resp.status().is_success() {
            return Err(CoreError::SupplierError(format!("train feed returned {}", resp.status())));
        }
        let body: FeedResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::SupplierError(StoreError::from(e).to_string()))?;

        Ok(body.data.into_iter().map(Train::from).collect())
    }
}

/// `"15:40"` -> 940
fn parse_duration(s: &str) -> Option<i32> {
    let (h, m) = s.trim().split_once(':')?;
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    (0..60).contains(&m).then_some(h * 60 + m)
}

const DAILY: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Placeholder timetable served when the rail API is unavailable.
pub fn fallback_trains(query: &TrainSearchQuery) -> Vec<Train> {
    let rows: [(&str, &str, &str, &str, i32, &[&str]); 4] = [
        ("12951", "Rajdhani Express", "16:55", "08:35", 940, &DAILY),
        ("22439", "Vande Bharat Express", "06:00", "14:00", 480, &["Mon", "Tue", "Wed", "Fri", "Sat", "Sun"]),
        ("12263", "Duronto Express", "23:00", "15:55", 1015, &["Tue", "Fri"]),
        ("12003", "Shatabdi Express", "06:10", "12:30", 380, &DAILY),
    ];

    rows.iter()
        .map(|(number, name, dep, arr, minutes, days)| Train {
            number: number.to_string(),
            name: name.to_string(),
            from_station: query.from.clone(),
            to_station: query.to.clone(),
            departure: dep.to_string(),
            arrival: arr.to_string(),
            duration_minutes: *minutes,
            runs_on: days.iter().map(|d| d.to_string()).collect(),
        })
        .collect()
}
