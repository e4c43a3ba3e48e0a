//! `StockEngine`: the public facade over ledger, orders and alerts.
//!
//! Every operation takes the calling tenant first. Anything owned by another
//! tenant is reported as `NotFound`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use stockledger_core::{Clock, DomainError, SystemClock, TenantId};
use stockledger_inventory::{
    Product, ProductEvent, ProductId, StockAlert, StockMovement, StockSettings, StockoutForecast,
};
use stockledger_purchasing::{
    OrderItemId, PurchaseOrder, PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderStatus,
    SupplierId,
};

use crate::alerts::AlertEvaluator;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{MovementLedger, MovementRecord, MovementRequest, NewProduct, ProductStore};
use crate::orders::{NewOrderItem, NewPurchaseOrder, OrderConsistencyEngine, OrderStore};
use crate::sequence::{InMemoryOrderNumberSequence, OrderNumberSequence};
use crate::store::InMemoryStreamStore;

pub struct StockEngine {
    config: EngineConfig,
    ledger: MovementLedger,
    orders: OrderConsistencyEngine,
    alerts: AlertEvaluator,
}

impl StockEngine {
    pub fn new(
        config: EngineConfig,
        products: Arc<ProductStore>,
        orders: Arc<OrderStore>,
        sequence: Arc<dyn OrderNumberSequence>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = MovementLedger::new(
            Arc::clone(&products),
            Arc::clone(&clock),
            config.max_commit_attempts,
            config.default_location.clone(),
        );
        let alerts = AlertEvaluator::new(
            Arc::clone(&products),
            Arc::clone(&clock),
            config.default_forecast_window_days,
        );
        let orders = OrderConsistencyEngine::new(
            orders,
            products,
            sequence,
            clock,
            config.max_commit_attempts,
        );

        Self {
            config,
            ledger,
            orders,
            alerts,
        }
    }

    /// Engine over in-memory stores and the wall clock.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::in_memory_with_clock(config, Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryStreamStore::<Product, ProductEvent>::new()),
            Arc::new(InMemoryStreamStore::<PurchaseOrder, PurchaseOrderEvent>::new()),
            Arc::new(InMemoryOrderNumberSequence::new()),
            clock,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- catalog ----

    #[instrument(skip(self, product), fields(tenant = %tenant_id, product = %product.product_id))]
    pub fn register_product(&self, tenant_id: TenantId, product: NewProduct) -> EngineResult<Product> {
        surface(self.ledger.register(tenant_id, product))
    }

    #[instrument(skip(self, settings), fields(tenant = %tenant_id, product = %product_id))]
    pub fn update_product_settings(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        settings: StockSettings,
        is_active: bool,
    ) -> EngineResult<Product> {
        surface(
            self.ledger
                .update_settings(tenant_id, product_id, settings, is_active),
        )
    }

    #[instrument(skip(self), fields(tenant = %tenant_id, product = %product_id))]
    pub fn get_product(&self, tenant_id: TenantId, product_id: ProductId) -> EngineResult<Product> {
        self.ledger.product(tenant_id, product_id)
    }

    #[instrument(skip(self), fields(tenant = %tenant_id))]
    pub fn list_products(&self, tenant_id: TenantId) -> EngineResult<Vec<Product>> {
        self.ledger.products(tenant_id)
    }

    // ---- ledger ----

    /// Record a movement. A transfer returns both legs.
    #[instrument(
        skip(self, request),
        fields(
            tenant = %tenant_id,
            product = %product_id,
            movement_type = %request.movement_type,
            quantity = request.quantity
        )
    )]
    pub fn record_movement(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        request: MovementRequest,
    ) -> EngineResult<MovementRecord> {
        let record = surface(self.ledger.append(tenant_id, product_id, request))?;
        info!(
            entries = record.entries.len(),
            current_stock = record.current_stock,
            "movement recorded"
        );
        Ok(record)
    }

    #[instrument(skip(self), fields(tenant = %tenant_id, product = %product_id))]
    pub fn movements(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<StockMovement>> {
        self.ledger.movements(tenant_id, product_id, since)
    }

    // ---- purchase orders ----

    #[instrument(skip(self), fields(tenant = %tenant_id, supplier = %supplier_id))]
    pub fn create_purchase_order(
        &self,
        tenant_id: TenantId,
        supplier_id: SupplierId,
        order_date: NaiveDate,
        expected_delivery: Option<NaiveDate>,
    ) -> EngineResult<PurchaseOrder> {
        let order = surface(self.orders.create(
            tenant_id,
            NewPurchaseOrder {
                supplier_id,
                order_date,
                expected_delivery,
            },
        ))?;
        info!(order = %order.id_typed(), order_number = %order.order_number(), "purchase order created");
        Ok(order)
    }

    #[instrument(skip(self, item), fields(tenant = %tenant_id, order = %order_id, product = %item.product_id))]
    pub fn add_order_item(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        item: NewOrderItem,
    ) -> EngineResult<PurchaseOrder> {
        surface(self.orders.add_item(tenant_id, order_id, item))
    }

    #[instrument(skip(self), fields(tenant = %tenant_id, order = %order_id))]
    pub fn update_order_item(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        item_id: OrderItemId,
        quantity: i64,
        unit_price: i64,
    ) -> EngineResult<PurchaseOrder> {
        surface(
            self.orders
                .update_item(tenant_id, order_id, item_id, quantity, unit_price),
        )
    }

    #[instrument(skip(self), fields(tenant = %tenant_id, order = %order_id))]
    pub fn remove_order_item(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        item_id: OrderItemId,
    ) -> EngineResult<PurchaseOrder> {
        surface(self.orders.remove_item(tenant_id, order_id, item_id))
    }

    #[instrument(skip(self), fields(tenant = %tenant_id, order = %order_id, to = %new_status))]
    pub fn change_order_status(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        new_status: PurchaseOrderStatus,
    ) -> EngineResult<PurchaseOrder> {
        surface(self.orders.change_status(tenant_id, order_id, new_status))
    }

    #[instrument(skip(self), fields(tenant = %tenant_id, order = %order_id))]
    pub fn get_order(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> EngineResult<PurchaseOrder> {
        self.orders.order(tenant_id, order_id)
    }

    #[instrument(skip(self), fields(tenant = %tenant_id))]
    pub fn list_orders(&self, tenant_id: TenantId) -> EngineResult<Vec<PurchaseOrder>> {
        self.orders.orders(tenant_id)
    }

    // ---- alerts ----

    #[instrument(skip(self), fields(tenant = %tenant_id))]
    pub fn get_stock_alerts(&self, tenant_id: TenantId) -> EngineResult<Vec<StockAlert>> {
        self.alerts.stock_alerts(tenant_id)
    }

    /// `window_days` defaults to the configured forecast window.
    #[instrument(skip(self), fields(tenant = %tenant_id, product = %product_id))]
    pub fn forecast_stockout(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        window_days: Option<u32>,
    ) -> EngineResult<StockoutForecast> {
        self.alerts.forecast(tenant_id, product_id, window_days)
    }
}

/// Log conflicts that survived the retry bound, then pass the result on.
fn surface<T>(result: EngineResult<T>) -> EngineResult<T> {
    if let Err(EngineError::Domain(DomainError::Conflict(reason))) = &result {
        warn!(%reason, "giving up after repeated commit conflicts");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockledger_core::{AggregateId, FixedClock};
    use stockledger_inventory::{Direction, LocationId, StockClassification};

    fn engine() -> (StockEngine, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        (
            StockEngine::in_memory_with_clock(EngineConfig::default(), clock.clone()),
            clock,
        )
    }

    fn register(engine: &StockEngine, tenant: TenantId, min: i64) -> ProductId {
        engine
            .register_product(
                tenant,
                NewProduct {
                    product_id: ProductId::new(AggregateId::new()),
                    sku: "CUP-01".to_string(),
                    name: "Cup".to_string(),
                    settings: StockSettings {
                        min_stock_level: min,
                        max_stock_level: None,
                        cost_price: 120,
                        selling_price: 300,
                    },
                    is_digital: false,
                },
            )
            .unwrap()
            .id_typed()
    }

    #[test]
    fn movements_feed_alerts_and_forecasts() {
        let (engine, clock) = engine();
        let tenant = TenantId::new();
        let cup = register(&engine, tenant, 10);

        engine
            .record_movement(tenant, cup, MovementRequest::inbound(50))
            .unwrap();
        clock.advance(chrono::Duration::days(1));
        let record = engine
            .record_movement(tenant, cup, MovementRequest::outbound(45).with_notes(" cafe "))
            .unwrap();
        assert_eq!(record.current_stock, 5);
        assert_eq!(record.entries[0].notes.as_deref(), Some("cafe"));

        let alerts = engine.get_stock_alerts(tenant).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].classification, StockClassification::LowStock);

        // 45 out over 30 days -> 1.5/day; 5 left -> 3 days.
        assert_eq!(
            engine.forecast_stockout(tenant, cup, None).unwrap(),
            StockoutForecast::Days(3)
        );
    }

    #[test]
    fn duplicate_registration_is_not_a_retryable_conflict() {
        let (engine, _) = engine();
        let tenant = TenantId::new();
        let product = NewProduct {
            product_id: ProductId::new(AggregateId::new()),
            sku: "CUP-02".to_string(),
            name: "Cup".to_string(),
            settings: StockSettings::default(),
            is_digital: false,
        };
        engine.register_product(tenant, product.clone()).unwrap();

        let err = engine.register_product(tenant, product).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Validation(_))));
        assert_eq!(engine.list_products(tenant).unwrap().len(), 1);
    }

    #[test]
    fn configured_default_location_is_used() {
        let config = EngineConfig {
            default_location: LocationId::new("store-1").unwrap(),
            ..EngineConfig::default()
        };
        let engine = StockEngine::in_memory(config);
        let tenant = TenantId::new();
        let cup = register(&engine, tenant, 0);

        let record = engine
            .record_movement(tenant, cup, MovementRequest::inbound(3))
            .unwrap();
        assert_eq!(record.entries[0].location.as_str(), "store-1");

        let record = engine
            .record_movement(
                tenant,
                cup,
                MovementRequest::adjustment(Direction::Outbound, 1).at(LocationId::new("store-1").unwrap()),
            )
            .unwrap();
        assert_eq!(record.current_stock, 2);
    }

    #[test]
    fn order_flow_through_the_facade() {
        let (engine, _) = engine();
        let tenant = TenantId::new();
        let cup = register(&engine, tenant, 0);

        let order = engine
            .create_purchase_order(
                tenant,
                SupplierId::new(AggregateId::new()),
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                None,
            )
            .unwrap();
        let id = order.id_typed();

        let err = engine
            .change_order_status(tenant, id, PurchaseOrderStatus::Submitted)
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Validation(_))));

        let order = engine
            .add_order_item(
                tenant,
                id,
                NewOrderItem {
                    product_id: cup,
                    quantity: 12,
                    unit_price: 120,
                },
            )
            .unwrap();
        let item = order.items()[0].id;
        let order = engine.update_order_item(tenant, id, item, 24, 110).unwrap();
        assert_eq!(order.total_amount(), 2640);

        engine
            .change_order_status(tenant, id, PurchaseOrderStatus::Submitted)
            .unwrap();
        let err = engine.remove_order_item(tenant, id, item).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Validation(_))));

        let order = engine
            .change_order_status(tenant, id, PurchaseOrderStatus::Cancelled)
            .unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Cancelled);
        assert_eq!(engine.get_order(tenant, id).unwrap(), order);
        assert_eq!(engine.list_orders(tenant).unwrap(), vec![order]);
    }

    #[test]
    fn tenants_are_isolated() {
        let (engine, _) = engine();
        let owner = TenantId::new();
        let stranger = TenantId::new();
        let cup = register(&engine, owner, 0);

        assert!(engine.get_product(stranger, cup).unwrap_err().is_not_found());
        assert!(engine.list_products(stranger).unwrap().is_empty());
        assert!(engine
            .forecast_stockout(stranger, cup, None)
            .unwrap_err()
            .is_not_found());
        assert_eq!(engine.list_products(owner).unwrap().len(), 1);
    }
}
