use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version};

/// Core trait for event store implementations.
///
/// Every implementation must guarantee that `append_if_version` is atomic with
/// respect to other appenders of the same aggregate: no two successful appends
/// may claim the same resulting version. Appends to different aggregates must
/// not contend with each other.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends `events` to the stream of `aggregate_id` if, and only if, the
    /// stream is currently at `expected_version`.
    ///
    /// The batch is written entirely or not at all. Returns the version of the
    /// last appended event, or `ConcurrencyConflict` if another writer got
    /// there first.
    async fn append_if_version(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version>;

    /// Returns every event of the aggregate in ascending version order.
    ///
    /// An unknown aggregate yields an empty vector, not an error.
    async fn read_all(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Returns the events of the aggregate with `version >= from_version`.
    async fn read_from(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Returns the current version of an aggregate, or None if it has no events.
    async fn current_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>>;

    /// Saves a snapshot, replacing any previous one for the same aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the latest snapshot for an aggregate.
    async fn get_snapshot(&self, aggregate_id: &AggregateId) -> Result<Option<Snapshot>>;
}

/// Convenience methods available on every event store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if an aggregate has any events.
    async fn aggregate_exists(&self, aggregate_id: &AggregateId) -> Result<bool> {
        Ok(self.current_version(aggregate_id).await?.is_some())
    }

    /// Loads the latest snapshot (if any) together with the events after it.
    ///
    /// Without a snapshot, returns None and the full stream.
    async fn load_with_snapshot(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id).await? {
            let events = self
                .read_from(aggregate_id, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.read_all(aggregate_id).await?;
            Ok((None, events))
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks a batch before it is appended on top of `expected_version`.
///
/// The batch must be non-empty, belong entirely to `aggregate_id` and one
/// aggregate type, and carry the versions `expected_version + 1 ..` without gaps.
pub fn validate_events_for_append(
    aggregate_id: &AggregateId,
    expected_version: Version,
    events: &[EventEnvelope],
) -> Result<()> {
    let invalid = |reason: String| EventStoreError::InvalidAppend {
        aggregate_id: aggregate_id.clone(),
        reason,
    };

    let Some(first) = events.first() else {
        return Err(invalid("cannot append an empty batch".to_string()));
    };

    let mut expected = expected_version;
    for event in events {
        if &event.aggregate_id != aggregate_id {
            return Err(invalid(format!(
                "event {} belongs to aggregate {}",
                event.event_id, event.aggregate_id
            )));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(invalid(
                "all events must have the same aggregate type".to_string(),
            ));
        }
        expected = expected.next();
        if event.version != expected {
            return Err(invalid(format!(
                "event versions must be sequential: expected {}, got {}",
                expected, event.version
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(aggregate_id: &str, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(AggregateId::new(aggregate_id))
            .aggregate_type("Order")
            .event_type("OrderAccepted")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn accepts_sequential_batch() {
        let id = AggregateId::new("a");
        let events = vec![event("a", 3), event("a", 4)];
        assert!(validate_events_for_append(&id, Version::new(2), &events).is_ok());
    }

    #[test]
    fn rejects_empty_batch() {
        let id = AggregateId::new("a");
        let result = validate_events_for_append(&id, Version::initial(), &[]);
        assert!(matches!(result, Err(EventStoreError::InvalidAppend { .. })));
    }

    #[test]
    fn rejects_foreign_aggregate() {
        let id = AggregateId::new("a");
        let events = vec![event("b", 1)];
        let result = validate_events_for_append(&id, Version::initial(), &events);
        assert!(matches!(result, Err(EventStoreError::InvalidAppend { .. })));
    }

    #[test]
    fn rejects_version_gap() {
        let id = AggregateId::new("a");
        let events = vec![event("a", 1), event("a", 3)];
        let result = validate_events_for_append(&id, Version::initial(), &events);
        assert!(matches!(result, Err(EventStoreError::InvalidAppend { .. })));
    }

    #[test]
    fn rejects_batch_not_following_expected_version() {
        let id = AggregateId::new("a");
        let events = vec![event("a", 1)];
        let result = validate_events_for_append(&id, Version::new(1), &events);
        assert!(matches!(result, Err(EventStoreError::InvalidAppend { .. })));
    }
}
