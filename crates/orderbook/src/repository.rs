//! Event-sourced repository: load by replay, apply with optimistic concurrency.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::AggregateId;
use event_store::{EventEnvelope, EventStore, EventStoreError, Snapshot, Version};
use tracing::{debug, error, warn};

use crate::aggregate::{Aggregate, DomainCommand};
use crate::error::DomainError;
use crate::observer::Observer;
use crate::registry::EventRegistry;

/// Default deadline for a single event store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a [`Repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Deadline for each event store call. On expiry the call is dropped and
    /// [`EventStoreError::Timeout`] is returned.
    pub store_timeout: Duration,

    /// Save a snapshot whenever the new version is a multiple of this value.
    /// None (or zero) disables snapshots.
    pub snapshot_interval: Option<u64>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            snapshot_interval: None,
        }
    }
}

impl RepositoryConfig {
    fn snapshot_due(&self, version: Version) -> bool {
        match self.snapshot_interval {
            Some(interval) if interval > 0 => {
                let v = version.as_i64();
                v > 0 && (v as u64).is_multiple_of(interval)
            }
            _ => false,
        }
    }

    fn snapshots_enabled(&self) -> bool {
        matches!(self.snapshot_interval, Some(interval) if interval > 0)
    }
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The envelopes that were persisted.
    pub events: Vec<EventEnvelope>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Orchestrates read-modify-write for one aggregate type.
///
/// The repository holds no per-aggregate lock: two commands racing on the
/// same aggregate both load, both decide, and the store's
/// `append_if_version` lets exactly one of them through. The loser gets
/// [`DomainError::ConcurrencyConflict`] and nothing is written.
pub struct Repository<S, A: Aggregate> {
    store: S,
    registry: Arc<EventRegistry<A::Event>>,
    observers: Vec<Arc<dyn Observer>>,
    config: RepositoryConfig,
}

impl<S, A> Repository<S, A>
where
    S: EventStore,
    A: Aggregate,
    DomainError: From<A::Error>,
{
    pub fn new(store: S, registry: impl Into<Arc<EventRegistry<A::Event>>>) -> Self {
        Self {
            store,
            registry: registry.into(),
            observers: Vec::new(),
            config: RepositoryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers an observer. Observers run in registration order.
    pub fn with_observer(self, observer: impl Observer + 'static) -> Self {
        self.with_shared_observer(Arc::new(observer))
    }

    /// Registers an observer that is also held elsewhere.
    pub fn with_shared_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &EventRegistry<A::Event> {
        &self.registry
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Loads an aggregate by replaying its events.
    ///
    /// Returns [`DomainError::AggregateNotFound`] if nothing is stored for `id`.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn load(&self, id: &AggregateId) -> Result<A, DomainError> {
        let aggregate = self.rehydrate(id).await?;
        if aggregate.version().is_initial() {
            return Err(self.not_found(id));
        }
        Ok(aggregate)
    }

    /// Returns the stored events of an aggregate without replaying them.
    pub async fn events(&self, id: &AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        let events = self.timed("read_all", self.store.read_all(id)).await?;
        if events.is_empty() {
            return Err(self.not_found(id));
        }
        Ok(events)
    }

    /// Validates `command` against the current state of `id` and appends the
    /// resulting events. Returns the new version.
    pub async fn apply(&self, id: &AggregateId, command: A::Command) -> Result<Version, DomainError> {
        Ok(self.execute(id, command).await?.new_version)
    }

    /// Same as [`Repository::apply`], also returning the updated aggregate and
    /// the persisted envelopes.
    #[tracing::instrument(
        skip(self, command),
        fields(aggregate_type = A::aggregate_type(), command = command.kind())
    )]
    pub async fn execute(
        &self,
        id: &AggregateId,
        command: A::Command,
    ) -> Result<CommandResult<A>, DomainError> {
        let mut aggregate = self.rehydrate(id).await?;
        let current_version = aggregate.version();

        match (current_version.is_initial(), command.is_creation()) {
            (true, false) => return Err(self.not_found(id)),
            (false, true) => {
                return Err(DomainError::AggregateAlreadyExists {
                    aggregate_type: A::aggregate_type(),
                    aggregate_id: id.clone(),
                });
            }
            _ => {}
        }

        let records = aggregate.decide(id, &command, Utc::now())?;
        if records.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let envelopes = records
            .iter()
            .map(|record| self.registry.encode(record))
            .collect::<Result<Vec<_>, _>>()?;

        let appended = self
            .timed(
                "append",
                self.store
                    .append_if_version(id, current_version, envelopes.clone()),
            )
            .await;
        let new_version = match appended {
            Ok(version) => version,
            Err(err @ DomainError::ConcurrencyConflict { .. }) => {
                metrics::counter!("repository_concurrency_conflicts_total").increment(1);
                debug!(%id, %current_version, "lost append race");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        aggregate.apply_all(&records);
        debug!(%id, %new_version, events = envelopes.len(), "events appended");

        self.notify(&envelopes);
        if self.config.snapshot_due(new_version) {
            self.save_snapshot(id, &aggregate).await;
        }

        Ok(CommandResult {
            aggregate,
            events: envelopes,
            new_version,
        })
    }

    /// Rebuilds the aggregate, starting from a snapshot when one is usable.
    /// Returns the empty aggregate when nothing is stored.
    async fn rehydrate(&self, id: &AggregateId) -> Result<A, DomainError> {
        if self.config.snapshots_enabled()
            && let Some(snapshot) = self.timed("get_snapshot", self.store.get_snapshot(id)).await?
        {
            let snapshot_version = snapshot.version;
            match snapshot.into_state::<A>() {
                Ok(aggregate) if aggregate.version() == snapshot_version => {
                    let tail = self
                        .timed(
                            "read_from",
                            self.store.read_from(id, snapshot_version.next()),
                        )
                        .await?;
                    return self.replay(id, aggregate, tail);
                }
                Ok(aggregate) => {
                    warn!(
                        %id,
                        %snapshot_version,
                        state_version = %aggregate.version(),
                        "snapshot version mismatch, replaying full stream"
                    );
                }
                Err(err) => {
                    warn!(%id, %snapshot_version, error = %err, "unreadable snapshot, replaying full stream");
                }
            }
        }

        let events = self.timed("read_all", self.store.read_all(id)).await?;
        self.replay(id, A::default(), events)
    }

    fn replay(
        &self,
        id: &AggregateId,
        mut aggregate: A,
        events: Vec<EventEnvelope>,
    ) -> Result<A, DomainError> {
        for envelope in &events {
            let expected = aggregate.version().next();
            if envelope.version != expected {
                error!(%id, %expected, found = %envelope.version, "corrupt event stream");
                return Err(DomainError::CorruptStream {
                    aggregate_id: id.clone(),
                    expected,
                    found: envelope.version,
                });
            }

            let record = self.registry.decode(envelope).inspect_err(|err| {
                error!(%id, event_type = %envelope.event_type, error = %err, "cannot decode stored event");
            })?;
            aggregate.apply(&record);
        }
        Ok(aggregate)
    }

    fn notify(&self, events: &[EventEnvelope]) {
        for event in events {
            for observer in &self.observers {
                if let Err(err) = observer.handle(event) {
                    metrics::counter!("repository_observer_failures_total").increment(1);
                    warn!(
                        observer = observer.name(),
                        aggregate_id = %event.aggregate_id,
                        version = %event.version,
                        event_type = %event.event_type,
                        error = %err,
                        "observer failed"
                    );
                }
            }
        }
    }

    async fn save_snapshot(&self, id: &AggregateId, aggregate: &A) {
        let snapshot = match Snapshot::from_state(
            id.clone(),
            A::aggregate_type(),
            aggregate.version(),
            aggregate,
        ) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%id, error = %err, "cannot serialize snapshot");
                return;
            }
        };

        match self
            .timed("save_snapshot", self.store.save_snapshot(snapshot))
            .await
        {
            Ok(()) => debug!(%id, version = %aggregate.version(), "snapshot saved"),
            Err(err) => warn!(%id, error = %err, "snapshot save failed"),
        }
    }

    /// Runs one store call under the configured deadline.
    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = event_store::Result<T>>,
    ) -> Result<T, DomainError> {
        let after = self.config.store_timeout;
        match tokio::time::timeout(after, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EventStoreError::Timeout { operation, after }.into()),
        }
    }

    fn not_found(&self, id: &AggregateId) -> DomainError {
        DomainError::AggregateNotFound {
            aggregate_type: A::aggregate_type(),
            aggregate_id: id.clone(),
        }
    }
}
