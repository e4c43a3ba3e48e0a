//! MovementLedger: the only write path for stock.
//!
//! Every movement is a `RecordMovement` command on the product's stream. The
//! ledger entry and the new stock level land in one commit, or neither does.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Clock, DomainError, TenantId, UserId};
use stockledger_inventory::{
    Direction, LocationId, MovementId, MovementType, Product, ProductCommand, ProductEvent,
    ProductId, RecordMovement, RegisterProduct, StockMovement, StockSettings,
    UpdateProductSettings,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::{EngineError, EngineResult};
use crate::store::StreamStore;

pub const PRODUCT_AGGREGATE: &str = "inventory.product";

pub type ProductStore = dyn StreamStore<Product, ProductEvent>;

/// Catalog facts for a new product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub settings: StockSettings,
    pub is_digital: bool,
}

/// A requested stock change.
///
/// `location` falls back to the engine's default location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub movement_type: MovementType,
    pub quantity: i64,
    /// Required for adjustments.
    pub direction: Option<Direction>,
    pub location: Option<LocationId>,
    /// Required for transfers.
    pub destination: Option<LocationId>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
}

impl MovementRequest {
    pub fn new(movement_type: MovementType, quantity: i64) -> Self {
        Self {
            movement_type,
            quantity,
            direction: None,
            location: None,
            destination: None,
            reference_number: None,
            notes: None,
            created_by: None,
        }
    }

    pub fn inbound(quantity: i64) -> Self {
        Self::new(MovementType::In, quantity)
    }

    pub fn outbound(quantity: i64) -> Self {
        Self::new(MovementType::Out, quantity)
    }

    pub fn adjustment(direction: Direction, quantity: i64) -> Self {
        Self {
            direction: Some(direction),
            ..Self::new(MovementType::Adjustment, quantity)
        }
    }

    pub fn transfer(from: LocationId, to: LocationId, quantity: i64) -> Self {
        Self {
            location: Some(from),
            destination: Some(to),
            ..Self::new(MovementType::Transfer, quantity)
        }
    }

    pub fn at(mut self, location: LocationId) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_reference(mut self, reference_number: impl Into<String>) -> Self {
        self.reference_number = Some(reference_number.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }
}

/// Outcome of a recorded movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    /// One entry, or both legs of a transfer (outbound first).
    pub entries: Vec<StockMovement>,
    pub current_stock: i64,
}

pub struct MovementLedger {
    dispatcher: CommandDispatcher<Arc<ProductStore>>,
    clock: Arc<dyn Clock>,
    default_location: LocationId,
}

impl MovementLedger {
    pub fn new(
        store: Arc<ProductStore>,
        clock: Arc<dyn Clock>,
        max_commit_attempts: u32,
        default_location: LocationId,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, max_commit_attempts),
            clock,
            default_location,
        }
    }

    pub fn register(&self, tenant_id: TenantId, product: NewProduct) -> EngineResult<Product> {
        let command = ProductCommand::RegisterProduct(RegisterProduct {
            tenant_id,
            product_id: product.product_id,
            sku: product.sku,
            name: product.name,
            settings: product.settings,
            is_digital: product.is_digital,
            occurred_at: self.clock.now(),
        });
        self.run(tenant_id, product.product_id, &command)
    }

    pub fn update_settings(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        settings: StockSettings,
        is_active: bool,
    ) -> EngineResult<Product> {
        let command = ProductCommand::UpdateProductSettings(UpdateProductSettings {
            tenant_id,
            product_id,
            settings,
            is_active,
            occurred_at: self.clock.now(),
        });
        self.run(tenant_id, product_id, &command)
    }

    /// Validate and append a movement, updating stock in the same commit.
    pub fn append(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        request: MovementRequest,
    ) -> EngineResult<MovementRecord> {
        let command = ProductCommand::RecordMovement(RecordMovement {
            tenant_id,
            product_id,
            movement_id: MovementId::new(),
            paired_movement_id: MovementId::new(),
            movement_type: request.movement_type,
            direction: request.direction,
            quantity: request.quantity,
            location: request
                .location
                .unwrap_or_else(|| self.default_location.clone()),
            destination: request.destination,
            reference_number: request.reference_number,
            notes: request.notes,
            created_by: request.created_by,
            occurred_at: self.clock.now(),
        });

        let dispatched = self.dispatcher.dispatch(
            tenant_id,
            product_id.0,
            PRODUCT_AGGREGATE,
            &command,
            None,
            |id| Product::empty(ProductId::new(id)),
        )?;

        Ok(MovementRecord {
            entries: dispatched
                .committed
                .iter()
                .filter_map(|e| e.payload().as_movement().cloned())
                .collect(),
            current_stock: dispatched.aggregate.current_stock(),
        })
    }

    pub fn product(&self, tenant_id: TenantId, product_id: ProductId) -> EngineResult<Product> {
        visible_product(self.dispatcher.store().as_ref(), tenant_id, product_id)
    }

    pub fn products(&self, tenant_id: TenantId) -> EngineResult<Vec<Product>> {
        Ok(self.dispatcher.store().list(tenant_id)?)
    }

    /// Ledger entries of a product in append order, optionally from `since`
    /// (inclusive).
    pub fn movements(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<StockMovement>> {
        self.product(tenant_id, product_id)?;
        let stream = self
            .dispatcher
            .read_stream::<Product, ProductEvent>(tenant_id, product_id.0)?;
        Ok(stream
            .into_iter()
            .filter_map(|e| match e.into_payload() {
                ProductEvent::MovementRecorded(m) => Some(m),
                _ => None,
            })
            .filter(|m| since.is_none_or(|s| m.created_at >= s))
            .collect())
    }

    fn run(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        command: &ProductCommand,
    ) -> EngineResult<Product> {
        let dispatched = self.dispatcher.dispatch(
            tenant_id,
            product_id.0,
            PRODUCT_AGGREGATE,
            command,
            None,
            |id| Product::empty(ProductId::new(id)),
        )?;
        Ok(dispatched.aggregate)
    }
}

/// Committed product owned by `tenant_id`; anything else is `NotFound`.
pub(crate) fn visible_product(
    store: &ProductStore,
    tenant_id: TenantId,
    product_id: ProductId,
) -> EngineResult<Product> {
    match store.load(tenant_id, product_id.0)? {
        Some(loaded)
            if loaded.snapshot.is_created() && loaded.snapshot.tenant_id() == Some(tenant_id) =>
        {
            Ok(loaded.snapshot)
        }
        _ => Err(EngineError::Domain(DomainError::not_found())),
    }
}
