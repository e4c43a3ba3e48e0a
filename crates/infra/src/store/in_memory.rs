use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use uuid::Uuid;

use stockledger_core::{AggregateId, ExpectedVersion, TenantId};
use stockledger_events::{Event, EventEnvelope};

use super::r#trait::{LoadedStream, StoreError, StreamStore, UncommittedEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

impl StreamKey {
    /// Smallest key of a tenant; ranges start here.
    fn first_of(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            aggregate_id: AggregateId::from_uuid(Uuid::nil()),
        }
    }
}

#[derive(Debug)]
struct Stream<A, E> {
    aggregate_type: String,
    snapshot: A,
    events: Vec<EventEnvelope<E>>,
}

impl<A, E> Stream<A, E> {
    fn version(&self) -> u64 {
        self.events.last().map(|e| e.sequence_number()).unwrap_or(0)
    }
}

#[derive(Debug)]
struct State<A, E> {
    streams: BTreeMap<StreamKey, Stream<A, E>>,
    unique_keys: HashSet<(TenantId, String)>,
}

impl<A, E> Default for State<A, E> {
    fn default() -> Self {
        Self {
            streams: BTreeMap::new(),
            unique_keys: HashSet::new(),
        }
    }
}

/// In-memory stream store.
///
/// One lock guards streams and unique keys together, so a commit is a single
/// critical section with no IO. Intended for tests, embedding and dev.
#[derive(Debug)]
pub struct InMemoryStreamStore<A, E> {
    state: RwLock<State<A, E>>,
}

impl<A, E> Default for InMemoryStreamStore<A, E> {
    fn default() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }
}

impl<A, E> InMemoryStreamStore<A, E> {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_batch<E>(events: &[UncommittedEvent<E>]) -> Result<(), StoreError> {
    let Some(first) = events.first() else {
        return Ok(());
    };
    for (idx, e) in events.iter().enumerate() {
        if e.tenant_id != first.tenant_id {
            return Err(StoreError::TenantIsolation(format!(
                "batch contains multiple tenant_ids (index {idx})"
            )));
        }
        if e.aggregate_id != first.aggregate_id {
            return Err(StoreError::InvalidCommit(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(StoreError::AggregateTypeMismatch(format!(
                "batch contains multiple aggregate_types (index {idx})"
            )));
        }
    }
    Ok(())
}

impl<A, E> StreamStore<A, E> for InMemoryStreamStore<A, E>
where
    A: Clone + Send + Sync,
    E: Event + Clone + Send + Sync,
{
    fn load(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Option<LoadedStream<A>>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };
        Ok(state.streams.get(&key).map(|s| LoadedStream {
            snapshot: s.snapshot.clone(),
            version: s.version(),
        }))
    }

    fn commit(
        &self,
        events: Vec<UncommittedEvent<E>>,
        expected_version: ExpectedVersion,
        snapshot: A,
        unique_key: Option<String>,
    ) -> Result<Vec<EventEnvelope<E>>, StoreError> {
        validate_batch(&events)?;
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let key = StreamKey {
            tenant_id: first.tenant_id,
            aggregate_id: first.aggregate_id,
        };
        let aggregate_type = first.aggregate_type.clone();

        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;

        let current = state.streams.get(&key).map(Stream::version).unwrap_or(0);
        if !expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = state.streams.get(&key) {
            if existing.aggregate_type != aggregate_type {
                return Err(StoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted commit with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let unique = unique_key.map(|k| (key.tenant_id, k));
        if let Some(claim) = &unique {
            if state.unique_keys.contains(claim) {
                return Err(StoreError::UniqueViolation(claim.1.clone()));
            }
        }

        // Every check passed; nothing below can fail.
        let committed: Vec<EventEnvelope<E>> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, seq)| e.into_envelope(seq))
            .collect();

        let stream = state.streams.entry(key).or_insert_with(|| Stream {
            aggregate_type,
            snapshot: snapshot.clone(),
            events: Vec::new(),
        });
        stream.events.extend(committed.iter().cloned());
        stream.snapshot = snapshot;

        if let Some(claim) = unique {
            state.unique_keys.insert(claim);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope<E>>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };
        Ok(state
            .streams
            .get(&key)
            .map(|s| s.events.clone())
            .unwrap_or_default())
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<A>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .streams
            .range(StreamKey::first_of(tenant_id)..)
            .take_while(|(k, _)| k.tenant_id == tenant_id)
            .map(|(_, s)| s.snapshot.clone())
            .collect())
    }
}
