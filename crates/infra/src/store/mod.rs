//! Versioned, tenant-scoped stream storage.
//!
//! A stream is the ordered events of one aggregate instance in one tenant,
//! stored together with the snapshot they fold into.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryStreamStore;
pub use r#trait::{LoadedStream, StoreError, StreamStore, UncommittedEvent};
