//! Per-tenant order number sequences.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use stockledger_core::TenantId;
use stockledger_purchasing::OrderNumber;

use crate::store::StoreError;

/// Issues strictly increasing order numbers, independently per tenant.
///
/// A number is never handed out twice. A number whose order was never
/// committed is skipped, not reused.
pub trait OrderNumberSequence: Send + Sync {
    fn next(&self, tenant_id: TenantId) -> Result<OrderNumber, StoreError>;
}

impl<S> OrderNumberSequence for Arc<S>
where
    S: OrderNumberSequence + ?Sized,
{
    fn next(&self, tenant_id: TenantId) -> Result<OrderNumber, StoreError> {
        (**self).next(tenant_id)
    }
}

/// Atomic counters kept in memory, starting at 1 for every tenant.
#[derive(Debug, Default)]
pub struct InMemoryOrderNumberSequence {
    counters: RwLock<HashMap<TenantId, Arc<AtomicU64>>>,
}

impl InMemoryOrderNumberSequence {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, tenant_id: TenantId) -> Result<Arc<AtomicU64>, StoreError> {
        {
            let counters = self.counters.read().map_err(|_| StoreError::Poisoned)?;
            if let Some(counter) = counters.get(&tenant_id) {
                return Ok(Arc::clone(counter));
            }
        }
        let mut counters = self.counters.write().map_err(|_| StoreError::Poisoned)?;
        Ok(Arc::clone(counters.entry(tenant_id).or_default()))
    }
}

impl OrderNumberSequence for InMemoryOrderNumberSequence {
    fn next(&self, tenant_id: TenantId) -> Result<OrderNumber, StoreError> {
        let counter = self.counter(tenant_id)?;
        let issued = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderNumber(issued))
    }
}
