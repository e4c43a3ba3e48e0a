//! Inventory domain module (event-sourced).
//!
//! Products, the stock ledger entries recorded against them, the fold that
//! turns those entries into current stock, and the read-only alert rules.
//! Pure domain logic: no IO, no locks, no storage.

pub mod alerts;
pub mod movement;
pub mod product;
pub mod stock;

pub use alerts::{
    StockAlert, StockClassification, StockoutForecast, classify, evaluate_alerts,
    forecast_stockout, suggested_reorder,
};
pub use movement::{Direction, LocationId, MovementId, MovementType, StockMovement};
pub use product::{
    Product, ProductCommand, ProductEvent, ProductId, ProductRegistered, ProductSettingsUpdated,
    RecordMovement, RegisterProduct, StockSettings, UpdateProductSettings,
};
pub use stock::StockLevels;
