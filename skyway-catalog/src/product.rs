use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use skyway_core::booking::BookedAncillary;

/// Ancillary services sold alongside a flight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    Meal,
    ExtraBaggage,
    SeatSelection,
    TravelInsurance,
    PriorityBoarding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncillaryProduct {
    pub code: String,
    pub product_type: ProductType,
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i64,
    pub is_active: bool,
}

impl AncillaryProduct {
    fn new(code: &str, product_type: ProductType, name: &str, description: &str, price_minor: i64) -> Self {
        Self {
            code: code.to_string(),
            product_type,
            name: name.to_string(),
            description: Some(description.to_string()),
            price_minor,
            is_active: true,
        }
    }
}

/// What the customer ticked for one passenger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AncillarySelection {
    pub code: String,
    pub passenger_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncillaryCatalog {
    products: Vec<AncillaryProduct>,
}

impl Default for AncillaryCatalog {
    fn default() -> Self {
        Self::new(vec![
            AncillaryProduct::new("MEAL-VEG", ProductType::Meal, "Vegetarian meal", "Hot vegetarian meal with beverage", 35_000),
            AncillaryProduct::new("MEAL-NV", ProductType::Meal, "Non-vegetarian meal", "Hot non-vegetarian meal with beverage", 40_000),
            AncillaryProduct::new("BAG-5", ProductType::ExtraBaggage, "Extra baggage 5 kg", "Prepaid excess baggage, 5 kg", 175_000),
            AncillaryProduct::new("BAG-10", ProductType::ExtraBaggage, "Extra baggage 10 kg", "Prepaid excess baggage, 10 kg", 325_000),
            AncillaryProduct::new("SEAT-XL", ProductType::SeatSelection, "Extra legroom seat", "Emergency-row or front-row seat", 60_000),
            AncillaryProduct::new("INS-TRIP", ProductType::TravelInsurance, "Trip protection", "Covers cancellation and baggage loss", 19_900),
            AncillaryProduct::new("PRIO", ProductType::PriorityBoarding, "Priority boarding", "Board in the first group", 25_000),
        ])
    }
}

impl AncillaryCatalog {
    pub fn new(products: Vec<AncillaryProduct>) -> Self {
        Self { products }
    }

    pub fn products(&self) -> impl Iterator<Item = &AncillaryProduct> {
        self.products.iter().filter(|p| p.is_active)
    }

    pub fn get(&self, code: &str) -> Option<&AncillaryProduct> {
        self.products().find(|p| p.code.eq_ignore_ascii_case(code))
    }

    /// Prices each selection. Unknown codes, passengers outside the party and
    /// repeated (code, passenger) pairs are rejected.
    pub fn resolve(&self, selections: &[AncillarySelection], passengers: u32) -> Result<Vec<BookedAncillary>, CatalogError> {
        let mut seen = HashSet::new();
        let mut booked = Vec::with_capacity(selections.len());

        for selection in selections {
            let product = self
                .get(&selection.code)
                .ok_or_else(|| CatalogError::UnknownProduct(selection.code.clone()))?;

            if selection.passenger_index >= passengers {
                return Err(CatalogError::InvalidPassenger(selection.passenger_index));
            }
            if !seen.insert((product.code.clone(), selection.passenger_index)) {
                return Err(CatalogError::Duplicate {
                    code: product.code.clone(),
                    passenger_index: selection.passenger_index,
                });
            }

            booked.push(BookedAncillary {
                code: product.code.clone(),
                name: product.name.clone(),
                passenger_index: selection.passenger_index,
                price_minor: product.price_minor,
            });
        }

        Ok(booked)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    UnknownProduct(String),

    #[error("No passenger at index {0}")]
    InvalidPassenger(u32),

    #[error("{code} already selected for passenger {passenger_index}")]
    Duplicate {
        code: String,
        passenger_index: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(code: &str, passenger_index: u32) -> AncillarySelection {
        AncillarySelection { code: code.to_string(), passenger_index }
    }

    #[test]
    fn test_resolve_prices_selections() {
        let catalog = AncillaryCatalog::default();
        let booked = catalog
            .resolve(&[pick("meal-veg", 0), pick("BAG-5", 1)], 2)
            .unwrap();
        assert_eq!(booked.len(), 2);
        assert_eq!(booked[0].code, "MEAL-VEG");
        assert_eq!(booked[0].price_minor, 35_000);
        assert_eq!(booked[1].passenger_index, 1);
    }

    #[test]
    fn test_resolve_rejects_bad_selections() {
        let catalog = AncillaryCatalog::default();
        assert_eq!(
            catalog.resolve(&[pick("LOUNGE", 0)], 1),
            Err(CatalogError::UnknownProduct("LOUNGE".to_string()))
        );
        assert_eq!(catalog.resolve(&[pick("PRIO", 2)], 2), Err(CatalogError::InvalidPassenger(2)));
        assert!(matches!(
            catalog.resolve(&[pick("PRIO", 0), pick("prio", 0)], 1),
            Err(CatalogError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_inactive_products_are_hidden() {
        let mut product = AncillaryProduct::new("OLD", ProductType::Meal, "Old", "Retired", 1);
        product.is_active = false;
        let catalog = AncillaryCatalog::new(vec![product]);
        assert!(catalog.get("OLD").is_none());
        assert_eq!(catalog.products().count(), 0);
    }
}
