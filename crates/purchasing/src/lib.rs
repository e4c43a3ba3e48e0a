//! Purchasing domain module (Purchase Orders, event-sourced).
//!
//! This crate contains business rules for purchase orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Order totals are
//! derived from line items on every applied event; order numbers are assigned
//! by the caller from a per-tenant sequence.

pub mod order;

pub use order::{
    AddItem, ChangeStatus, CreatePurchaseOrder, ItemAdded, ItemRemoved, ItemUpdated, OrderItemId,
    OrderNumber, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderEvent,
    PurchaseOrderId, PurchaseOrderItem, PurchaseOrderStatus, RemoveItem, StatusChanged,
    SupplierId, UpdateItem,
};
