//! Core aggregate, command and domain event traits.

use std::fmt;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Send + Sync + Clone + fmt::Debug {
    /// Returns the event kind name.
    ///
    /// This is the name stored alongside the payload and looked up in the
    /// [`EventRegistry`](crate::EventRegistry) when replaying.
    fn event_type(&self) -> &'static str;

    /// Serializes the event-specific payload, without the kind tag.
    fn payload(&self) -> serde_json::Result<serde_json::Value>;
}

/// Trait for commands handled by an aggregate.
pub trait DomainCommand: Send + Sync + fmt::Debug {
    /// Short lowercase name of the command, used for logs and metrics.
    fn kind(&self) -> &'static str;

    /// Returns true if the command starts a new aggregate.
    fn is_creation(&self) -> bool;
}

/// A domain event together with its position in the aggregate's stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord<E> {
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub event: E,
}

impl<E> EventRecord<E> {
    pub fn new(
        aggregate_id: AggregateId,
        version: Version,
        timestamp: DateTime<Utc>,
        event: E,
    ) -> Self {
        Self {
            aggregate_id,
            version,
            timestamp,
            event,
        }
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate is rebuilt by replaying its events through [`Aggregate::apply`]
/// and validates commands through [`Aggregate::decide`]. Both functions are pure:
/// the aggregate never performs I/O and never reads the clock.
///
/// The state must be serializable so that it can be stored as a snapshot.
pub trait Aggregate: Default + Send + Sync + Sized + Serialize + DeserializeOwned {
    /// The closed set of commands this aggregate accepts.
    type Command: DomainCommand;

    /// The closed set of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of validation errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier, or None before the first event.
    fn id(&self) -> Option<&AggregateId>;

    /// Returns the version of the last applied event (0 when empty).
    fn version(&self) -> Version;

    /// Applies one event to the aggregate.
    ///
    /// Must be deterministic and infallible: events are facts that already
    /// happened. Sets the aggregate version to `record.version`.
    fn apply(&mut self, record: &EventRecord<Self::Event>);

    /// Validates a command against the current state and returns the events it
    /// produces, versioned from `self.version() + 1`.
    ///
    /// `now` is the timestamp stamped on the produced events.
    fn decide(
        &self,
        id: &AggregateId,
        command: &Self::Command,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventRecord<Self::Event>>, Self::Error>;

    /// Applies multiple events in sequence.
    fn apply_all<'a>(&mut self, records: impl IntoIterator<Item = &'a EventRecord<Self::Event>>)
    where
        Self::Event: 'a,
    {
        for record in records {
            self.apply(record);
        }
    }
}
