use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use stockledger_core::{AggregateId, ExpectedVersion, TenantId};
use stockledger_events::{Event, EventEnvelope};

/// An event decided by an aggregate, not yet assigned a sequence number.
///
/// The store assigns sequence numbers during commit and returns the
/// resulting [`EventEnvelope`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncommittedEvent<E> {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub payload: E,
}

impl<E> UncommittedEvent<E> {
    pub fn new(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            payload,
        }
    }

    pub(crate) fn into_envelope(self, sequence_number: u64) -> EventEnvelope<E>
    where
        E: Event,
    {
        EventEnvelope::new(
            self.event_id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type,
            sequence_number,
            self.payload,
        )
    }
}

/// Latest committed state of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedStream<A> {
    /// Aggregate folded over every committed event.
    pub snapshot: A,
    /// Number of committed events.
    pub version: u64,
}

/// Stream store failure.
///
/// These are substrate errors (storage, concurrency, isolation), as opposed
/// to domain errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("unique key already taken: {0}")]
    UniqueViolation(String),

    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Tenant-scoped, versioned stream store.
///
/// Each stream is keyed by `(tenant_id, aggregate_id)` and holds an
/// append-only event sequence plus the snapshot those events fold into.
///
/// `commit`:
/// - validates that every event targets the same tenant and aggregate
/// - checks `expected_version` against the current stream version
/// - claims `unique_key` (if any) within the tenant
/// - assigns sequence numbers starting at `current_version + 1`
/// - appends the events and replaces the snapshot
///
/// All of it happens atomically: either every check passes and everything is
/// written, or nothing changes.
pub trait StreamStore<A, E>: Send + Sync {
    /// Latest snapshot and version, or `None` if the stream does not exist
    /// for this tenant.
    fn load(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Option<LoadedStream<A>>, StoreError>;

    fn commit(
        &self,
        events: Vec<UncommittedEvent<E>>,
        expected_version: ExpectedVersion,
        snapshot: A,
        unique_key: Option<String>,
    ) -> Result<Vec<EventEnvelope<E>>, StoreError>;

    /// Every committed event of a stream, in sequence order.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope<E>>, StoreError>;

    /// Snapshots of every stream owned by a tenant.
    fn list(&self, tenant_id: TenantId) -> Result<Vec<A>, StoreError>;
}

impl<S, A, E> StreamStore<A, E> for Arc<S>
where
    S: StreamStore<A, E> + ?Sized,
{
    fn load(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Option<LoadedStream<A>>, StoreError> {
        (**self).load(tenant_id, aggregate_id)
    }

    fn commit(
        &self,
        events: Vec<UncommittedEvent<E>>,
        expected_version: ExpectedVersion,
        snapshot: A,
        unique_key: Option<String>,
    ) -> Result<Vec<EventEnvelope<E>>, StoreError> {
        (**self).commit(events, expected_version, snapshot, unique_key)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope<E>>, StoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<A>, StoreError> {
        (**self).list(tenant_id)
    }
}
