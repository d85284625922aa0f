use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, validate_events_for_append},
};

/// Name of the unique constraint on `(aggregate_id, version)`.
///
/// Losing an insert race on this constraint is how concurrent appenders
/// learn that someone else claimed the version first.
const UNIQUE_AGGREGATE_VERSION: &str = "unique_aggregate_version";

/// PostgreSQL-backed event store.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store over a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::new(row.try_get::<String, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: DateTime::from_timestamp_nanos(row.try_get("timestamp_ns")?),
            payload: row.try_get("payload")?,
            metadata,
        })
    }
}

/// Timestamps are stored as Unix nanoseconds so they read back exactly.
/// Representable from 1677 to 2262.
fn unix_nanos(timestamp: DateTime<Utc>) -> Option<i64> {
    timestamp.timestamp_nanos_opt()
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn append_if_version(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_events_for_append(aggregate_id, expected_version, &events)?;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_str())
                .fetch_one(&mut *tx)
                .await?;
        let actual = Version::new(current.unwrap_or(0));

        if actual != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: aggregate_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        // A concurrent transaction may have passed the check above too; the
        // unique constraint decides which one wins.
        let mut last_version = expected_version;
        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;
            let timestamp_ns = unix_nanos(event.timestamp).ok_or_else(|| {
                EventStoreError::InvalidAppend {
                    aggregate_id: aggregate_id.clone(),
                    reason: format!(
                        "timestamp {} of version {} is outside the storable range",
                        event.timestamp, event.version
                    ),
                }
            })?;

            sqlx::query(
                r#"
                INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, timestamp_ns, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_str())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(timestamp_ns)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some(UNIQUE_AGGREGATE_VERSION)
                {
                    return EventStoreError::ConcurrencyConflict {
                        aggregate_id: aggregate_id.clone(),
                        expected: expected_version,
                        actual: event.version,
                    };
                }
                EventStoreError::Database(e)
            })?;

            last_version = event.version;
        }

        tx.commit().await.map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(UNIQUE_AGGREGATE_VERSION)
            {
                return EventStoreError::ConcurrencyConflict {
                    aggregate_id: aggregate_id.clone(),
                    expected: expected_version,
                    actual: last_version,
                };
            }
            EventStoreError::Database(e)
        })?;

        Ok(last_version)
    }

    async fn read_all(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        self.read_from(aggregate_id, Version::first()).await
    }

    async fn read_from(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp_ns, payload, metadata
            FROM events
            WHERE aggregate_id = $1 AND version >= $2
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id.as_str())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn current_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let timestamp_ns = unix_nanos(snapshot.timestamp).ok_or_else(|| {
            EventStoreError::InvalidAppend {
                aggregate_id: snapshot.aggregate_id.clone(),
                reason: format!(
                    "snapshot timestamp {} is outside the storable range",
                    snapshot.timestamp
                ),
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, timestamp_ns, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                timestamp_ns = EXCLUDED.timestamp_ns,
                state = EXCLUDED.state
            WHERE snapshots.version < EXCLUDED.version
            "#,
        )
        .bind(snapshot.aggregate_id.as_str())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(timestamp_ns)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: &AggregateId) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, timestamp_ns, state
            FROM snapshots
            WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Snapshot {
                aggregate_id: AggregateId::new(row.try_get::<String, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                timestamp: DateTime::from_timestamp_nanos(row.try_get("timestamp_ns")?),
                state: row.try_get("state")?,
            })),
            None => Ok(None),
        }
    }
}
