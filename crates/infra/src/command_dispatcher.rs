//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the latest snapshot and stream version (tenant-scoped)
//!   ↓
//! 2. Handle the command on that snapshot (pure decision, produces events)
//!   ↓
//! 3. Fold the new events into the snapshot
//!   ↓
//! 4. Commit events + snapshot, expecting the loaded version
//!   ↓
//! 5. On a version conflict, go back to 1 (bounded)
//! ```
//!
//! A command is re-decided against fresh state on every attempt, so a retry
//! never commits a decision made on stale stock or a stale order.

use tracing::debug;

use stockledger_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use stockledger_events::{Event, EventEnvelope, ensure_same_tenant};

use crate::error::{EngineError, EngineResult};
use crate::store::{StoreError, StreamStore, UncommittedEvent};

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched<A, E> {
    /// State after the committed events.
    pub aggregate: A,
    /// Committed events with their sequence numbers. Empty if the command
    /// decided nothing.
    pub committed: Vec<EventEnvelope<E>>,
}

/// Reusable command execution engine over a [`StreamStore`].
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
    max_attempts: u32,
}

impl<S> CommandDispatcher<S> {
    /// `max_attempts` is clamped to at least one.
    pub fn new(store: S, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Dispatch a command, retrying on optimistic concurrency conflicts.
    ///
    /// `unique_key` is claimed in the same commit as the events; see
    /// [`StreamStore::commit`].
    ///
    /// Domain errors are never retried. After `max_attempts` conflicting
    /// commits the last conflict is returned as [`DomainError::Conflict`].
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        unique_key: Option<&str>,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> EngineResult<Dispatched<A, A::Event>>
    where
        S: StreamStore<A, A::Event>,
        A: Aggregate<Error = DomainError> + Clone,
        A::Event: Event,
    {
        let mut last_conflict = String::new();

        for attempt in 1..=self.max_attempts {
            // 1) Load
            let (mut aggregate, version) = match self.store.load(tenant_id, aggregate_id)? {
                Some(loaded) => (loaded.snapshot, loaded.version),
                None => (make_aggregate(aggregate_id), 0),
            };

            // 2) Decide
            let decided = aggregate.handle(command)?;
            if decided.is_empty() {
                return Ok(Dispatched {
                    aggregate,
                    committed: vec![],
                });
            }

            // 3) Fold
            for event in &decided {
                aggregate.apply(event);
            }

            // 4) Commit
            let uncommitted = decided
                .into_iter()
                .map(|e| UncommittedEvent::new(tenant_id, aggregate_id, aggregate_type, e))
                .collect();
            match self.store.commit(
                uncommitted,
                ExpectedVersion::from_loaded(version),
                aggregate.clone(),
                unique_key.map(str::to_string),
            ) {
                Ok(committed) => return Ok(Dispatched { aggregate, committed }),
                Err(StoreError::Concurrency(msg)) => {
                    debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        %aggregate_id,
                        reason = %msg,
                        "commit conflicted; reloading"
                    );
                    last_conflict = msg;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(EngineError::Domain(DomainError::conflict(format!(
            "{aggregate_type} {aggregate_id} kept changing after {} attempts ({last_conflict})",
            self.max_attempts
        ))))
    }

    /// Load a stream's committed events, re-validating them against the
    /// calling tenant and the requested aggregate.
    pub fn read_stream<A, E>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> EngineResult<Vec<EventEnvelope<E>>>
    where
        S: StreamStore<A, E>,
    {
        let stream = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &stream)?;
        Ok(stream)
    }
}

fn validate_loaded_stream<E>(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[EventEnvelope<E>],
) -> EngineResult<()> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if ensure_same_tenant(tenant_id, e).is_err() {
            return Err(StoreError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            ))
            .into());
        }
        if e.aggregate_id() != aggregate_id {
            return Err(StoreError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))
            .into());
        }
        if e.sequence_number() != last + 1 {
            return Err(StoreError::InvalidCommit(format!(
                "gap in loaded stream (last={last}, found={})",
                e.sequence_number()
            ))
            .into());
        }
        last = e.sequence_number();
    }
    Ok(())
}
