use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{AggregateId, TenantId};

use crate::Event;

/// Envelope for a committed event, carrying tenant + stream metadata.
///
/// This is the unit a stream store persists.
///
/// Notes:
/// - **Multi-tenancy** is enforced here via `tenant_id`.
/// - **Append-only**: `sequence_number` is strictly increasing per stream,
///   starting at 1, with no gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,

    aggregate_id: AggregateId,
    aggregate_type: String,

    /// Position in the aggregate stream.
    sequence_number: u64,

    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self
    where
        E: Event,
    {
        Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: payload.event_type().to_string(),
            event_version: payload.version(),
            occurred_at: payload.occurred_at(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Pinged {
        at: DateTime<Utc>,
    }

    impl Event for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn version(&self) -> u32 {
            2
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn new_copies_event_metadata() {
        let at = Utc::now();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            TenantId::new(),
            AggregateId::new(),
            "test.aggregate",
            1,
            Pinged { at },
        );

        assert_eq!(env.event_type(), "test.pinged");
        assert_eq!(env.event_version(), 2);
        assert_eq!(env.occurred_at(), at);
        assert_eq!(env.aggregate_type(), "test.aggregate");
    }

    #[test]
    fn envelope_serializes_payload_inline() {
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            TenantId::new(),
            AggregateId::new(),
            "test.aggregate",
            3,
            Pinged { at: Utc::now() },
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["sequence_number"], 3);
        assert!(json["payload"]["at"].is_string());
    }
}
