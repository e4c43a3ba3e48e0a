//! Domain events and the tenant-scoped envelopes they are stored in.

pub mod envelope;
pub mod event;
pub mod tenant;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use tenant::{TenantScoped, ensure_same_tenant};
