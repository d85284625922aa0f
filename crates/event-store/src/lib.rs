//! Append-only event storage for event-sourced aggregates.
//!
//! The [`EventStore`] trait is the only serialization point for concurrent
//! writers: [`EventStore::append_if_version`] either appends a whole batch on top
//! of the expected version or rejects it with
//! [`EventStoreError::ConcurrencyConflict`].

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EnvelopeError, EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{EventStore, EventStoreExt, validate_events_for_append};
