use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use stockledger_events::Event;
use stockledger_inventory::ProductId;

/// Purchase order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Supplier reference. Supplier records live outside this engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

impl SupplierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Line item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderItemId(pub Uuid);

impl OrderItemId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OrderItemId {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential, per-tenant order number. Displayed as `PO-000042`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(pub u64);

impl OrderNumber {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PO-{:06}", self.0)
    }
}

impl FromStr for OrderNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix("PO-").unwrap_or(s.trim());
        let n: u64 = digits
            .parse()
            .map_err(|_| DomainError::invalid_id(format!("OrderNumber: '{s}'")))?;
        if n == 0 {
            return Err(DomainError::invalid_id("OrderNumber: numbering starts at 1"));
        }
        Ok(Self(n))
    }
}

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Submitted,
    Approved,
    Ordered,
    PartiallyReceived,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Submitted => "submitted",
            PurchaseOrderStatus::Approved => "approved",
            PurchaseOrderStatus::Ordered => "ordered",
            PurchaseOrderStatus::PartiallyReceived => "partially_received",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    /// Transition table.
    ///
    /// `draft → submitted → approved → ordered → {partially_received, received}`,
    /// `partially_received → received`, and `cancelled` from anything that is
    /// neither received nor already cancelled.
    pub fn can_transition_to(self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Submitted, Approved)
                | (Approved, Ordered)
                | (Ordered, PartiallyReceived)
                | (Ordered, Received)
                | (PartiallyReceived, Received)
                | (_, Cancelled)
        )
    }

    /// Received and cancelled orders accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled)
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use PurchaseOrderStatus::*;
        [Draft, Submitted, Approved, Ordered, PartiallyReceived, Received, Cancelled]
            .into_iter()
            .find(|st| st.as_str() == s.trim())
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// Purchase order line item. `line_total` is always `quantity × unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: OrderItemId,
    pub purchase_order_id: PurchaseOrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Smallest currency unit.
    pub unit_price: i64,
    pub line_total: i64,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    supplier_id: Option<SupplierId>,
    order_number: OrderNumber,
    status: PurchaseOrderStatus,
    order_date: Option<NaiveDate>,
    expected_delivery: Option<NaiveDate>,
    items: Vec<PurchaseOrderItem>,
    total_amount: i64,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            supplier_id: None,
            order_number: OrderNumber(0),
            status: PurchaseOrderStatus::Draft,
            order_date: None,
            expected_delivery: None,
            items: Vec::new(),
            total_amount: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn order_number(&self) -> OrderNumber {
        self.order_number
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn expected_delivery(&self) -> Option<NaiveDate> {
        self.expected_delivery
    }

    pub fn items(&self) -> &[PurchaseOrderItem] {
        &self.items
    }

    pub fn item(&self, item_id: OrderItemId) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn total_amount(&self) -> i64 {
        self.total_amount
    }

    fn recompute_total(&mut self) {
        self.total_amount = self.items.iter().map(|i| i.line_total).sum();
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    pub order_number: OrderNumber,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItem (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItem {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub item_id: OrderItemId,
    pub quantity: i64,
    pub unit_price: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub item_id: OrderItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub new_status: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddItem(AddItem),
    UpdateItem(UpdateItem),
    RemoveItem(RemoveItem),
    ChangeStatus(ChangeStatus),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    pub order_number: OrderNumber,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub tenant_id: TenantId,
    pub item: PurchaseOrderItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub item_id: OrderItemId,
    pub quantity: i64,
    pub unit_price: i64,
    pub line_total: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub item_id: OrderItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub from: PurchaseOrderStatus,
    pub to: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    ItemAdded(ItemAdded),
    ItemUpdated(ItemUpdated),
    ItemRemoved(ItemRemoved),
    StatusChanged(StatusChanged),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::ItemAdded(_) => "purchasing.order.item_added",
            PurchaseOrderEvent::ItemUpdated(_) => "purchasing.order.item_updated",
            PurchaseOrderEvent::ItemRemoved(_) => "purchasing.order.item_removed",
            PurchaseOrderEvent::StatusChanged(_) => "purchasing.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::ItemAdded(e) => e.occurred_at,
            PurchaseOrderEvent::ItemUpdated(e) => e.occurred_at,
            PurchaseOrderEvent::ItemRemoved(e) => e.occurred_at,
            PurchaseOrderEvent::StatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.supplier_id = Some(e.supplier_id);
                self.order_number = e.order_number;
                self.status = PurchaseOrderStatus::Draft;
                self.order_date = Some(e.order_date);
                self.expected_delivery = e.expected_delivery;
                self.items.clear();
                self.created = true;
            }
            PurchaseOrderEvent::ItemAdded(e) => {
                self.items.push(e.item.clone());
            }
            PurchaseOrderEvent::ItemUpdated(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == e.item_id) {
                    item.quantity = e.quantity;
                    item.unit_price = e.unit_price;
                    item.line_total = e.line_total;
                }
            }
            PurchaseOrderEvent::ItemRemoved(e) => {
                self.items.retain(|i| i.id != e.item_id);
            }
            PurchaseOrderEvent::StatusChanged(e) => {
                self.status = e.to;
            }
        }

        // The total is derived, never carried by an event.
        self.recompute_total();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddItem(cmd) => self.handle_add_item(cmd),
            PurchaseOrderCommand::UpdateItem(cmd) => self.handle_update_item(cmd),
            PurchaseOrderCommand::RemoveItem(cmd) => self.handle_remove_item(cmd),
            PurchaseOrderCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
        }
    }
}

fn line_total(quantity: i64, unit_price: i64) -> Result<i64, DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    if unit_price < 0 {
        return Err(DomainError::validation("unit_price cannot be negative"));
    }
    quantity
        .checked_mul(unit_price)
        .ok_or_else(|| DomainError::validation("line total overflow"))
}

impl PurchaseOrder {
    /// Foreign-tenant orders look exactly like missing ones.
    fn ensure_visible(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created || self.tenant_id != Some(tenant_id) {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), DomainError> {
        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::validation(format!(
                "items can only change while the order is a draft (status: {})",
                self.status
            )));
        }
        Ok(())
    }

    /// Total after replacing `replaced` (if any) with `line_total`.
    fn checked_total(
        &self,
        replaced: Option<OrderItemId>,
        line_total: i64,
    ) -> Result<i64, DomainError> {
        self.items
            .iter()
            .filter(|i| Some(i.id) != replaced)
            .try_fold(line_total, |acc, i| acc.checked_add(i.line_total))
            .ok_or_else(|| DomainError::validation("order total overflow"))
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation("purchase order already exists"));
        }
        if cmd.order_number.value() == 0 {
            return Err(DomainError::invariant("order numbers start at 1"));
        }
        if let Some(expected) = cmd.expected_delivery {
            if expected < cmd.order_date {
                return Err(DomainError::validation(
                    "expected delivery cannot precede the order date",
                ));
            }
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                supplier_id: cmd.supplier_id,
                order_number: cmd.order_number,
                order_date: cmd.order_date,
                expected_delivery: cmd.expected_delivery,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_visible(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_editable()?;

        if self.item(cmd.item_id).is_some() {
            return Err(DomainError::validation("order item already exists"));
        }
        let line_total = line_total(cmd.quantity, cmd.unit_price)?;
        self.checked_total(None, line_total)?;

        Ok(vec![PurchaseOrderEvent::ItemAdded(ItemAdded {
            tenant_id: cmd.tenant_id,
            item: PurchaseOrderItem {
                id: cmd.item_id,
                purchase_order_id: cmd.order_id,
                product_id: cmd.product_id,
                quantity: cmd.quantity,
                unit_price: cmd.unit_price,
                line_total,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(
        &self,
        cmd: &UpdateItem,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_visible(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_editable()?;

        if self.item(cmd.item_id).is_none() {
            return Err(DomainError::not_found());
        }
        let line_total = line_total(cmd.quantity, cmd.unit_price)?;
        self.checked_total(Some(cmd.item_id), line_total)?;

        Ok(vec![PurchaseOrderEvent::ItemUpdated(ItemUpdated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            line_total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(
        &self,
        cmd: &RemoveItem,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_visible(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_editable()?;

        if self.item(cmd.item_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![PurchaseOrderEvent::ItemRemoved(ItemRemoved {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeStatus,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_visible(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.status.can_transition_to(cmd.new_status) {
            return Err(DomainError::invalid_transition(self.status, cmd.new_status));
        }
        if cmd.new_status == PurchaseOrderStatus::Submitted && self.items.is_empty() {
            return Err(DomainError::validation(
                "cannot submit purchase order without items",
            ));
        }

        Ok(vec![PurchaseOrderEvent::StatusChanged(StatusChanged {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            from: self.status,
            to: cmd.new_status,
            occurred_at: cmd.occurred_at,
        })])
    }
}
