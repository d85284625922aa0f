use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, validate_events_for_append},
};

type Stream = Arc<Mutex<Vec<EventEnvelope>>>;

/// In-memory event store.
///
/// Each aggregate owns its own stream behind its own lock. The index lock is
/// held only long enough to find or create a stream, so writers to different
/// aggregates never wait on each other while appending.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<AggregateId, Stream>>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored across all aggregates.
    pub async fn event_count(&self) -> usize {
        let streams: Vec<Stream> = self.streams.read().await.values().cloned().collect();
        let mut total = 0;
        for stream in streams {
            total += stream.lock().await.len();
        }
        total
    }

    /// Clears all events and snapshots.
    pub async fn clear(&self) {
        self.streams.write().await.clear();
        self.snapshots.write().await.clear();
    }

    async fn stream(&self, aggregate_id: &AggregateId) -> Option<Stream> {
        self.streams.read().await.get(aggregate_id).cloned()
    }

    async fn stream_or_insert(&self, aggregate_id: &AggregateId) -> Stream {
        if let Some(stream) = self.stream(aggregate_id).await {
            return stream;
        }
        self.streams
            .write()
            .await
            .entry(aggregate_id.clone())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_if_version(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_events_for_append(aggregate_id, expected_version, &events)?;

        // Only a first append may create a stream; anything else against an
        // unknown aggregate is a conflict and must leave the index untouched.
        let stream = if expected_version.is_initial() {
            self.stream_or_insert(aggregate_id).await
        } else {
            match self.stream(aggregate_id).await {
                Some(stream) => stream,
                None => {
                    return Err(EventStoreError::ConcurrencyConflict {
                        aggregate_id: aggregate_id.clone(),
                        expected: expected_version,
                        actual: Version::initial(),
                    });
                }
            }
        };
        let mut stream = stream.lock().await;

        let actual = stream
            .last()
            .map(|e| e.version)
            .unwrap_or(Version::initial());
        if actual != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: aggregate_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let last_version = events.last().map(|e| e.version).unwrap_or(actual);
        stream.extend(events);
        Ok(last_version)
    }

    async fn read_all(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        match self.stream(aggregate_id).await {
            Some(stream) => Ok(stream.lock().await.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn read_from(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        match self.stream(aggregate_id).await {
            Some(stream) => Ok(stream
                .lock()
                .await
                .iter()
                .filter(|e| e.version >= from_version)
                .cloned()
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn current_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        match self.stream(aggregate_id).await {
            Some(stream) => Ok(stream.lock().await.last().map(|e| e.version)),
            None => Ok(None),
        }
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.aggregate_id.clone(), snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: &AggregateId) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(aggregate_id).cloned())
    }
}
