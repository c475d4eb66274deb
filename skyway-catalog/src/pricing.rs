use serde::{Deserialize, Serialize};
use skyway_core::booking::{BookedAncillary, FareBreakdown};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Applied to the base fare only.
    pub tax_rate: f64,

    /// Charged once per passenger (minor units).
    pub convenience_fee_minor: i64,

    /// Taxes and estimates are rounded to a multiple of this (100 = whole rupees).
    pub rounding_minor: i64,

    /// Estimated fare for live results that carry no price: base + per-minute.
    pub estimate_base_minor: i64,
    pub estimate_per_minute_minor: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: 0.05,
            convenience_fee_minor: 19_900,
            rounding_minor: 100,
            estimate_base_minor: 250_000,
            estimate_per_minute_minor: 3_500,
        }
    }
}

/// Computes what the customer is charged for a booking
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn quote(&self, flight_price_minor: i64, passengers: u32, ancillaries: &[BookedAncillary]) -> FareBreakdown {
        let base_fare_minor = flight_price_minor * passengers as i64;
        let taxes_minor = self.round(base_fare_minor as f64 * self.config.tax_rate);
        let convenience_fee_minor = self.config.convenience_fee_minor * passengers as i64;
        let ancillaries_minor: i64 = ancillaries.iter().map(|a| a.price_minor).sum();

        FareBreakdown {
            base_fare_minor,
            taxes_minor,
            convenience_fee_minor,
            ancillaries_minor,
            total_minor: base_fare_minor + taxes_minor + convenience_fee_minor + ancillaries_minor,
        }
    }

    /// Indicative one-way fare for a flight of the given length.
    pub fn estimate_fare(&self, duration_minutes: i32) -> i64 {
        let minutes = duration_minutes.max(0) as f64;
        self.round(self.config.estimate_base_minor as f64 + minutes * self.config.estimate_per_minute_minor as f64)
    }

    fn round(&self, value: f64) -> i64 {
        let step = self.config.rounding_minor.max(1) as f64;
        ((value / step).round() * step) as i64
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}
