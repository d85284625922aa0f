//! Domain error types.

use common::AggregateId;
use event_store::{EnvelopeError, EventStoreError, Version};
use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur during repository and domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No events are stored for the aggregate.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// A creation command targeted an aggregate that already has events.
    #[error("Aggregate already exists: {aggregate_type} with id {aggregate_id}")]
    AggregateAlreadyExists {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// Another writer appended to the aggregate first.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// A stored event kind has no decoder in the registry.
    #[error("Unknown event kind {event_type} for aggregate type {aggregate_type}")]
    UnknownEventKind {
        aggregate_type: &'static str,
        event_type: String,
    },

    /// A stored event payload does not match its kind.
    #[error("Malformed {event_type} event: {source}")]
    MalformedEvent {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The stored stream has a version gap or is out of order.
    #[error("Corrupt stream for aggregate {aggregate_id}: expected version {expected}, found {found}")]
    CorruptStream {
        aggregate_id: AggregateId,
        expected: Version,
        found: Version,
    },

    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid event envelope: {0}")]
    Envelope(#[from] EnvelopeError),
}

impl DomainError {
    /// Returns true for errors that mean the stored data cannot be trusted.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            DomainError::UnknownEventKind { .. }
                | DomainError::MalformedEvent { .. }
                | DomainError::CorruptStream { .. }
        )
    }

    /// Short label used as the `outcome` of command metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DomainError::AggregateNotFound { .. } => "not_found",
            DomainError::AggregateAlreadyExists { .. } => "already_exists",
            DomainError::ConcurrencyConflict { .. } => "conflict",
            DomainError::UnknownEventKind { .. }
            | DomainError::MalformedEvent { .. }
            | DomainError::CorruptStream { .. } => "integrity",
            DomainError::Order(_) => "rejected",
            DomainError::EventStore(EventStoreError::Timeout { .. }) => "timeout",
            DomainError::EventStore(_)
            | DomainError::Serialization(_)
            | DomainError::Envelope(_) => "store_error",
        }
    }
}

impl From<EventStoreError> for DomainError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            other => DomainError::EventStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn store_conflict_becomes_domain_conflict() {
        let err: DomainError = EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new("order-1"),
            expected: Version::new(1),
            actual: Version::new(2),
        }
        .into();

        assert!(matches!(
            err,
            DomainError::ConcurrencyConflict { expected, actual, .. }
                if expected == Version::new(1) && actual == Version::new(2)
        ));
        assert_eq!(err.label(), "conflict");
    }

    #[test]
    fn other_store_errors_pass_through() {
        let err: DomainError = EventStoreError::Timeout {
            operation: "append",
            after: Duration::from_millis(10),
        }
        .into();

        assert!(matches!(
            err,
            DomainError::EventStore(EventStoreError::Timeout { .. })
        ));
        assert_eq!(err.label(), "timeout");
        assert!(!err.is_integrity());
    }
}
