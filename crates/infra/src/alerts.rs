//! AlertEvaluator: read-only stock health over committed snapshots.

use std::sync::Arc;

use stockledger_core::{Clock, TenantId};
use stockledger_events::ensure_same_tenant;
use stockledger_inventory::{
    ProductEvent, ProductId, StockAlert, StockoutForecast, evaluate_alerts, forecast_stockout,
};

use crate::error::EngineResult;
use crate::ledger::{ProductStore, visible_product};

pub struct AlertEvaluator {
    products: Arc<ProductStore>,
    clock: Arc<dyn Clock>,
    default_window_days: u32,
}

impl AlertEvaluator {
    pub fn new(products: Arc<ProductStore>, clock: Arc<dyn Clock>, default_window_days: u32) -> Self {
        Self {
            products,
            clock,
            default_window_days,
        }
    }

    /// Low and out-of-stock products of a tenant, most urgent first.
    pub fn stock_alerts(&self, tenant_id: TenantId) -> EngineResult<Vec<StockAlert>> {
        let products = self.products.list(tenant_id)?;
        Ok(evaluate_alerts(&products))
    }

    /// Days of stock left at the average daily outflow of the trailing window.
    pub fn forecast(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        window_days: Option<u32>,
    ) -> EngineResult<StockoutForecast> {
        let product = visible_product(self.products.as_ref(), tenant_id, product_id)?;
        let window_days = window_days.unwrap_or(self.default_window_days);

        let history = self.products.load_stream(tenant_id, product_id.0)?;
        for e in &history {
            ensure_same_tenant(tenant_id, e)?;
        }
        let movements = history.iter().filter_map(|e| match e.payload() {
            ProductEvent::MovementRecorded(m) => Some(m),
            _ => None,
        });

        Ok(forecast_stockout(
            product.current_stock(),
            movements,
            window_days,
            self.clock.now(),
        )?)
    }
}
