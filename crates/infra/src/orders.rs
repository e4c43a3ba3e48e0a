//! OrderConsistencyEngine: purchase order lifecycle with derived totals.
//!
//! Item writes and the recomputed `total_amount` commit together on the
//! order's stream; order numbers come from a per-tenant sequence and are
//! claimed as a unique key in the creating commit.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::error;

use stockledger_core::{AggregateId, Clock, DomainError, TenantId};
use stockledger_inventory::ProductId;
use stockledger_purchasing::{
    AddItem, ChangeStatus, CreatePurchaseOrder, OrderItemId, OrderNumber, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderStatus, RemoveItem,
    SupplierId, UpdateItem,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{ProductStore, visible_product};
use crate::sequence::OrderNumberSequence;
use crate::store::{StoreError, StreamStore};

pub const ORDER_AGGREGATE: &str = "purchasing.order";

pub type OrderStore = dyn StreamStore<PurchaseOrder, PurchaseOrderEvent>;

/// Header of a new purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier_id: SupplierId,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
}

/// A line to add to a draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Smallest currency unit.
    pub unit_price: i64,
}

fn order_number_key(number: OrderNumber) -> String {
    format!("order_number:{}", number.value())
}

pub struct OrderConsistencyEngine {
    dispatcher: CommandDispatcher<Arc<OrderStore>>,
    products: Arc<ProductStore>,
    sequence: Arc<dyn OrderNumberSequence>,
    clock: Arc<dyn Clock>,
}

impl OrderConsistencyEngine {
    pub fn new(
        orders: Arc<OrderStore>,
        products: Arc<ProductStore>,
        sequence: Arc<dyn OrderNumberSequence>,
        clock: Arc<dyn Clock>,
        max_commit_attempts: u32,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(orders, max_commit_attempts),
            products,
            sequence,
            clock,
        }
    }

    /// Create a draft order under the tenant's next order number.
    ///
    /// A number drawn for a create that then fails validation is skipped.
    pub fn create(&self, tenant_id: TenantId, header: NewPurchaseOrder) -> EngineResult<PurchaseOrder> {
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let order_number = self.sequence.next(tenant_id)?;
        let command = PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            tenant_id,
            order_id,
            supplier_id: header.supplier_id,
            order_number,
            order_date: header.order_date,
            expected_delivery: header.expected_delivery,
            occurred_at: self.clock.now(),
        });

        let key = order_number_key(order_number);
        match self.run(tenant_id, order_id, &command, Some(&key)) {
            Err(EngineError::Store(StoreError::UniqueViolation(_))) => {
                error!(
                    tenant = %tenant_id,
                    %order_number,
                    "order number issued twice by the sequence"
                );
                Err(EngineError::Domain(DomainError::DuplicateOrderNumber(
                    order_number.to_string(),
                )))
            }
            other => other,
        }
    }

    /// Add a line. The product must exist in the tenant and be active.
    pub fn add_item(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        item: NewOrderItem,
    ) -> EngineResult<PurchaseOrder> {
        let product = visible_product(self.products.as_ref(), tenant_id, item.product_id)?;
        if !product.is_active() {
            return Err(DomainError::validation(format!(
                "product {} is inactive",
                product.sku()
            ))
            .into());
        }

        let command = PurchaseOrderCommand::AddItem(AddItem {
            tenant_id,
            order_id,
            item_id: OrderItemId::new(),
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            occurred_at: self.clock.now(),
        });
        self.run(tenant_id, order_id, &command, None)
    }

    pub fn update_item(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        item_id: OrderItemId,
        quantity: i64,
        unit_price: i64,
    ) -> EngineResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::UpdateItem(UpdateItem {
            tenant_id,
            order_id,
            item_id,
            quantity,
            unit_price,
            occurred_at: self.clock.now(),
        });
        self.run(tenant_id, order_id, &command, None)
    }

    pub fn remove_item(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        item_id: OrderItemId,
    ) -> EngineResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::RemoveItem(RemoveItem {
            tenant_id,
            order_id,
            item_id,
            occurred_at: self.clock.now(),
        });
        self.run(tenant_id, order_id, &command, None)
    }

    pub fn change_status(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        new_status: PurchaseOrderStatus,
    ) -> EngineResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::ChangeStatus(ChangeStatus {
            tenant_id,
            order_id,
            new_status,
            occurred_at: self.clock.now(),
        });
        self.run(tenant_id, order_id, &command, None)
    }

    pub fn order(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> EngineResult<PurchaseOrder> {
        match self.dispatcher.store().load(tenant_id, order_id.0)? {
            Some(loaded)
                if loaded.snapshot.is_created()
                    && loaded.snapshot.tenant_id() == Some(tenant_id) =>
            {
                Ok(loaded.snapshot)
            }
            _ => Err(DomainError::not_found().into()),
        }
    }

    /// Committed orders of a tenant, ordered by order number.
    pub fn orders(&self, tenant_id: TenantId) -> EngineResult<Vec<PurchaseOrder>> {
        let mut orders = self.dispatcher.store().list(tenant_id)?;
        orders.sort_by_key(PurchaseOrder::order_number);
        Ok(orders)
    }

    fn run(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        command: &PurchaseOrderCommand,
        unique_key: Option<&str>,
    ) -> EngineResult<PurchaseOrder> {
        let dispatched = self.dispatcher.dispatch(
            tenant_id,
            order_id.0,
            ORDER_AGGREGATE,
            command,
            unique_key,
            |id| PurchaseOrder::empty(PurchaseOrderId::new(id)),
        )?;
        Ok(dispatched.aggregate)
    }
}
