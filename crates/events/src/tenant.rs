use stockledger_core::{DomainError, TenantId};

use crate::EventEnvelope;

/// Types that belong to exactly one tenant.
///
/// Every record the engine hands out implements this, so callers and tests can
/// check that nothing crosses the tenant boundary.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id()
    }
}

/// Treat a record owned by another tenant as absent.
///
/// Cross-tenant access is reported as `NotFound`, never as a permission error,
/// so a caller cannot learn that a foreign id exists.
pub fn ensure_same_tenant<T>(caller: TenantId, record: &T) -> Result<(), DomainError>
where
    T: TenantScoped + ?Sized,
{
    if record.tenant_id() == caller {
        Ok(())
    } else {
        Err(DomainError::not_found())
    }
}
