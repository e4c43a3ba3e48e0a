//! Engine-level error: domain failures plus substrate failures.

use thiserror::Error;

use stockledger_core::DomainError;

use crate::store::StoreError;

/// Error returned by every engine operation.
///
/// Domain failures pass through unchanged. Store failures that have a domain
/// meaning are translated: a version conflict that survived the retry bound
/// becomes [`DomainError::Conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => EngineError::Domain(DomainError::Conflict(msg)),
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            EngineError::Store(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Domain(DomainError::NotFound))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_concurrency_surfaces_as_conflict() {
        let err = EngineError::from(StoreError::Concurrency("expected 3, found 4".into()));
        assert!(matches!(err, EngineError::Domain(DomainError::Conflict(_))));
    }

    #[test]
    fn substrate_failures_stay_store_errors() {
        let err = EngineError::from(StoreError::Poisoned);
        assert_eq!(err, EngineError::Store(StoreError::Poisoned));
        assert!(err.as_domain().is_none());
    }

    #[test]
    fn domain_errors_display_unchanged() {
        let err = EngineError::from(DomainError::insufficient_stock(1, 0));
        assert_eq!(err.to_string(), "insufficient stock: requested 1, available 0");
    }
}
