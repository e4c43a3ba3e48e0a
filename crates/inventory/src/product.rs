use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use stockledger_events::Event;

use crate::alerts::{StockClassification, classify};
use crate::movement::{
    Direction, LocationId, MovementId, MovementType, StockMovement, clean_text,
};
use crate::stock::StockLevels;

/// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Catalog facts the stock engine reads: thresholds and prices.
///
/// Prices are in the smallest currency unit (e.g. cents).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSettings {
    pub min_stock_level: i64,
    pub max_stock_level: Option<i64>,
    pub cost_price: i64,
    pub selling_price: i64,
}

impl StockSettings {
    fn validate(&self) -> Result<(), DomainError> {
        if self.min_stock_level < 0 {
            return Err(DomainError::validation("min_stock_level cannot be negative"));
        }
        if let Some(max) = self.max_stock_level {
            if max < self.min_stock_level {
                return Err(DomainError::validation(
                    "max_stock_level cannot be below min_stock_level",
                ));
            }
        }
        if self.cost_price < 0 || self.selling_price < 0 {
            return Err(DomainError::validation("prices cannot be negative"));
        }
        Ok(())
    }
}

/// Aggregate root: Product.
///
/// The stream of a product holds its catalog facts and every ledger entry
/// recorded against it; `current_stock` is only ever the fold of those entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    settings: StockSettings,
    is_active: bool,
    is_digital: bool,
    stock: StockLevels,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            settings: StockSettings::default(),
            is_active: false,
            is_digital: false,
            stock: StockLevels::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &StockSettings {
        &self.settings
    }

    pub fn min_stock_level(&self) -> i64 {
        self.settings.min_stock_level
    }

    pub fn max_stock_level(&self) -> Option<i64> {
        self.settings.max_stock_level
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_digital(&self) -> bool {
        self.is_digital
    }

    pub fn current_stock(&self) -> i64 {
        self.stock.total()
    }

    pub fn stock(&self) -> &StockLevels {
        &self.stock
    }

    /// Whether stock alerts apply to this product at all.
    pub fn tracks_stock(&self) -> bool {
        self.created && self.is_active && !self.is_digital
    }

    pub fn classification(&self) -> StockClassification {
        classify(self.current_stock(), self.min_stock_level())
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub settings: StockSettings,
    pub is_digital: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductSettings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductSettings {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub settings: StockSettings,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement.
///
/// `direction` is required for adjustments and rejected otherwise.
/// `destination` is required for transfers and rejected otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub movement_id: MovementId,
    /// Id of the inbound leg of a transfer.
    pub paired_movement_id: MovementId,
    pub movement_type: MovementType,
    pub direction: Option<Direction>,
    pub quantity: i64,
    pub location: LocationId,
    pub destination: Option<LocationId>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    RegisterProduct(RegisterProduct),
    UpdateProductSettings(UpdateProductSettings),
    RecordMovement(RecordMovement),
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub settings: StockSettings,
    pub is_digital: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductSettingsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSettingsUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub settings: StockSettings,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductRegistered(ProductRegistered),
    ProductSettingsUpdated(ProductSettingsUpdated),
    /// One ledger entry.
    MovementRecorded(StockMovement),
}

impl ProductEvent {
    pub fn as_movement(&self) -> Option<&StockMovement> {
        match self {
            ProductEvent::MovementRecorded(m) => Some(m),
            _ => None,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "inventory.product.registered",
            ProductEvent::ProductSettingsUpdated(_) => "inventory.product.settings_updated",
            ProductEvent::MovementRecorded(_) => "inventory.product.movement_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductRegistered(e) => e.occurred_at,
            ProductEvent::ProductSettingsUpdated(e) => e.occurred_at,
            ProductEvent::MovementRecorded(e) => e.created_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductRegistered(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.settings = e.settings.clone();
                self.is_digital = e.is_digital;
                self.is_active = true;
                self.stock = StockLevels::default();
                self.created = true;
            }
            ProductEvent::ProductSettingsUpdated(e) => {
                self.settings = e.settings.clone();
                self.is_active = e.is_active;
            }
            ProductEvent::MovementRecorded(m) => {
                self.stock.fold(m);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::RegisterProduct(cmd) => self.handle_register(cmd),
            ProductCommand::UpdateProductSettings(cmd) => self.handle_update(cmd),
            ProductCommand::RecordMovement(cmd) => self.handle_movement(cmd),
        }
    }
}

impl Product {
    /// Foreign-tenant products look exactly like missing ones.
    fn ensure_visible(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created || self.tenant_id != Some(tenant_id) {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation("product already exists"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        cmd.settings.validate()?;

        Ok(vec![ProductEvent::ProductRegistered(ProductRegistered {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            sku: cmd.sku.trim().to_string(),
            name: cmd.name.trim().to_string(),
            settings: cmd.settings.clone(),
            is_digital: cmd.is_digital,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(
        &self,
        cmd: &UpdateProductSettings,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_visible(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;
        cmd.settings.validate()?;

        Ok(vec![ProductEvent::ProductSettingsUpdated(
            ProductSettingsUpdated {
                tenant_id: cmd.tenant_id,
                product_id: cmd.product_id,
                settings: cmd.settings.clone(),
                is_active: cmd.is_active,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_visible(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;

        if self.is_digital {
            return Err(DomainError::validation("digital products carry no stock"));
        }
        // Retired products take no new receipts; held stock can still leave.
        if !self.is_active && cmd.movement_type == MovementType::In {
            return Err(DomainError::validation("product is inactive"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.movement_type != MovementType::Adjustment && cmd.direction.is_some() {
            return Err(DomainError::validation(
                "direction is only accepted for adjustments",
            ));
        }
        if cmd.movement_type != MovementType::Transfer && cmd.destination.is_some() {
            return Err(DomainError::validation(
                "destination is only accepted for transfers",
            ));
        }

        let entries = match cmd.movement_type {
            MovementType::In => {
                vec![self.entry(cmd, cmd.movement_id, Direction::Inbound, &cmd.location, None)]
            }
            MovementType::Out => {
                vec![self.entry(cmd, cmd.movement_id, Direction::Outbound, &cmd.location, None)]
            }
            MovementType::Adjustment => {
                let direction = cmd.direction.ok_or_else(|| {
                    DomainError::validation("adjustments need a direction")
                })?;
                vec![self.entry(cmd, cmd.movement_id, direction, &cmd.location, None)]
            }
            MovementType::Transfer => {
                let destination = cmd.destination.as_ref().ok_or_else(|| {
                    DomainError::validation("transfers need a destination location")
                })?;
                if *destination == cmd.location {
                    return Err(DomainError::validation(
                        "transfer destination must differ from source",
                    ));
                }
                if cmd.paired_movement_id == cmd.movement_id {
                    return Err(DomainError::invariant("transfer legs need distinct ids"));
                }
                let link = Some(cmd.movement_id);
                vec![
                    self.entry(cmd, cmd.movement_id, Direction::Outbound, &cmd.location, link),
                    self.entry(cmd, cmd.paired_movement_id, Direction::Inbound, destination, link),
                ]
            }
        };

        // Both legs of a transfer must fit, or neither is recorded.
        let mut scratch = self.stock.clone();
        for e in &entries {
            scratch.apply(e)?;
        }

        Ok(entries.into_iter().map(ProductEvent::MovementRecorded).collect())
    }

    fn entry(
        &self,
        cmd: &RecordMovement,
        id: MovementId,
        direction: Direction,
        location: &LocationId,
        transfer_id: Option<MovementId>,
    ) -> StockMovement {
        StockMovement {
            id,
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            movement_type: cmd.movement_type,
            direction,
            quantity: cmd.quantity,
            location: location.clone(),
            transfer_id,
            reference_number: clean_text(&cmd.reference_number),
            notes: clean_text(&cmd.notes),
            created_at: cmd.occurred_at,
            created_by: cmd.created_by,
        }
    }
}
