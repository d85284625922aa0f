//! Mapping between stored event kind names and typed domain events.

use std::collections::HashMap;
use std::fmt;

use event_store::EventEnvelope;

use crate::aggregate::{DomainEvent, EventRecord};
use crate::error::DomainError;

/// Decodes the payload of one event kind.
pub type Decoder<E> = fn(serde_json::Value) -> serde_json::Result<E>;

/// Explicit registry of the event kinds an aggregate type understands.
///
/// Built once at startup and handed to the [`Repository`](crate::Repository).
/// A stored event whose kind is not registered fails to load with
/// [`DomainError::UnknownEventKind`].
pub struct EventRegistry<E> {
    aggregate_type: &'static str,
    decoders: HashMap<&'static str, Decoder<E>>,
}

impl<E: DomainEvent> EventRegistry<E> {
    /// Creates an empty registry for the given aggregate type.
    pub fn new(aggregate_type: &'static str) -> Self {
        Self {
            aggregate_type,
            decoders: HashMap::new(),
        }
    }

    /// Registers the decoder for one event kind, replacing any previous one.
    pub fn register(mut self, event_type: &'static str, decoder: Decoder<E>) -> Self {
        self.decoders.insert(event_type, decoder);
        self
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Returns the registered kind names in no particular order.
    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Turns a stored envelope back into a typed event record.
    pub fn decode(&self, envelope: &EventEnvelope) -> Result<EventRecord<E>, DomainError> {
        let decoder =
            self.decoders
                .get(envelope.event_type.as_str())
                .ok_or_else(|| DomainError::UnknownEventKind {
                    aggregate_type: self.aggregate_type,
                    event_type: envelope.event_type.clone(),
                })?;

        let event = decoder(envelope.payload.clone()).map_err(|source| {
            DomainError::MalformedEvent {
                event_type: envelope.event_type.clone(),
                source,
            }
        })?;

        Ok(EventRecord::new(
            envelope.aggregate_id.clone(),
            envelope.version,
            envelope.timestamp,
            event,
        ))
    }

    /// Builds the stored form of an event record.
    ///
    /// Refuses kinds that are not registered, so nothing is written that could
    /// not be read back.
    pub fn encode(&self, record: &EventRecord<E>) -> Result<EventEnvelope, DomainError> {
        let event_type = record.event.event_type();
        if !self.contains(event_type) {
            return Err(DomainError::UnknownEventKind {
                aggregate_type: self.aggregate_type,
                event_type: event_type.to_string(),
            });
        }

        let envelope = EventEnvelope::builder()
            .aggregate_id(record.aggregate_id.clone())
            .aggregate_type(self.aggregate_type)
            .event_type(event_type)
            .version(record.version)
            .timestamp(record.timestamp)
            .payload_raw(record.event.payload()?)
            .build()?;

        Ok(envelope)
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("EventRegistry")
            .field("aggregate_type", &self.aggregate_type)
            .field("event_types", &kinds)
            .finish()
    }
}
