//! Alert evaluation: stock classification and stockout forecasts.
//!
//! Everything here is a read-only function of committed state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult};

use crate::movement::StockMovement;
use crate::product::{Product, ProductId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockClassification {
    OutOfStock,
    LowStock,
    Ok,
}

pub fn classify(current_stock: i64, min_stock_level: i64) -> StockClassification {
    if current_stock <= 0 {
        StockClassification::OutOfStock
    } else if current_stock <= min_stock_level {
        StockClassification::LowStock
    } else {
        StockClassification::Ok
    }
}

/// Days until stock runs out at the recent consumption rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockoutForecast {
    Days(u64),
    /// No outbound movements in the window.
    Unknown,
}

/// Forecast a stockout from the trailing `window_days` of ledger history.
///
/// Average daily outflow is the `out` quantity inside `(now - window, now]`
/// divided by the window length; the result is rounded down.
pub fn forecast_stockout<'a>(
    current_stock: i64,
    movements: impl IntoIterator<Item = &'a StockMovement>,
    window_days: u32,
    now: DateTime<Utc>,
) -> DomainResult<StockoutForecast> {
    if window_days == 0 {
        return Err(DomainError::validation("forecast window must be at least one day"));
    }
    let since = now - Duration::days(i64::from(window_days));

    let outflow: i128 = movements
        .into_iter()
        .filter(|m| m.is_outflow() && m.created_at > since && m.created_at <= now)
        .map(|m| i128::from(m.quantity))
        .sum();

    if outflow == 0 {
        return Ok(StockoutForecast::Unknown);
    }

    // stock / (outflow / window) == stock * window / outflow
    let days = i128::from(current_stock.max(0)) * i128::from(window_days) / outflow;
    Ok(StockoutForecast::Days(u64::try_from(days).unwrap_or(u64::MAX)))
}

/// Quantity that brings stock back up to its target level.
///
/// The target is `max_stock_level` when set, otherwise `min_stock_level`.
pub fn suggested_reorder(product: &Product) -> i64 {
    let min = product.min_stock_level();
    let target = product.max_stock_level().unwrap_or(min).max(min);
    (target - product.current_stock()).max(0)
}

/// One product that needs attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub current_stock: i64,
    pub min_stock_level: i64,
    pub classification: StockClassification,
    pub suggested_reorder: i64,
}

impl StockAlert {
    /// `None` for healthy, inactive, or digital products.
    pub fn for_product(product: &Product) -> Option<Self> {
        if !product.tracks_stock() {
            return None;
        }
        let classification = product.classification();
        if classification == StockClassification::Ok {
            return None;
        }
        Some(Self {
            product_id: product.id_typed(),
            sku: product.sku().to_string(),
            name: product.name().to_string(),
            current_stock: product.current_stock(),
            min_stock_level: product.min_stock_level(),
            classification,
            suggested_reorder: suggested_reorder(product),
        })
    }
}

/// Alerts for a set of products, most urgent first (out of stock, then lowest stock).
pub fn evaluate_alerts<'a>(products: impl IntoIterator<Item = &'a Product>) -> Vec<StockAlert> {
    let mut alerts: Vec<StockAlert> = products.into_iter().filter_map(StockAlert::for_product).collect();
    alerts.sort_by(|a, b| {
        a.classification
            .cmp(&b.classification)
            .then(a.current_stock.cmp(&b.current_stock))
            .then_with(|| a.sku.cmp(&b.sku))
    });
    alerts
}
