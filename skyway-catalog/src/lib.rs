pub mod product;
pub mod pricing;
pub mod inventory;

pub use product::{AncillaryCatalog, AncillaryProduct, AncillarySelection, ProductType, CatalogError};
pub use pricing::{PricingEngine, PricingConfig};
pub use inventory::InventoryError;
