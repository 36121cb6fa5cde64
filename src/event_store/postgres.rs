//! PostgreSQL Event Log
//!
//! Events live in the `events` table. A unique `(aggregate_id, version)`
//! constraint backs the optimistic check, and a `BIGSERIAL` sequence gives
//! the global append order for `read_all`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Event, EventRecord};

use super::log::{check_expected_version, validate_batch};
use super::{EventLog, EventStoreError};

const UNIQUE_VIOLATION: &str = "23505";

type EventRow = (Uuid, String, i64, String, serde_json::Value, DateTime<Utc>);

/// Event log stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct PostgresEventLog {
    pool: PgPool,
}

impl PostgresEventLog {
    /// Create a new event log with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        sql: &'static str,
        aggregate_id: Option<&str>,
        after_version: i64,
    ) -> Result<Vec<Event>, EventStoreError> {
        let mut query = sqlx::query_as::<_, EventRow>(sql);
        if let Some(aggregate_id) = aggregate_id {
            query = query.bind(aggregate_id).bind(after_version);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_event)
            .collect()
    }
}

fn row_to_event(
    (id, aggregate_id, version, event_type, data, timestamp): EventRow,
) -> Result<Event, EventStoreError> {
    let record = EventRecord {
        id,
        aggregate_id,
        event_type,
        data,
        timestamp,
        version,
    };
    Ok(Event::try_from(record)?)
}

impl EventLog for PostgresEventLog {
    async fn append_conditional(
        &self,
        aggregate_id: &str,
        expected_version: i64,
        events: &[Event],
    ) -> Result<(), EventStoreError> {
        validate_batch(aggregate_id, expected_version, events)?;

        let mut tx = self.pool.begin().await?;

        // Serialize writers of this aggregate until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(aggregate_id)
            .execute(&mut *tx)
            .await?;

        let actual: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(version), 0) FROM events WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await?;

        check_expected_version(aggregate_id, expected_version, actual)?;

        for event in events {
            let record = EventRecord::from(event.clone());
            sqlx::query(
                r#"
                INSERT INTO events (id, aggregate_id, version, event_type, event_data, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.id)
            .bind(&record.aggregate_id)
            .bind(record.version)
            .bind(&record.event_type)
            .bind(&record.data)
            .bind(record.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_error(e, aggregate_id, expected_version))?;
        }

        tx.commit().await?;

        tracing::debug!(
            aggregate_id,
            expected_version,
            appended = events.len(),
            "events appended to postgres log"
        );

        Ok(())
    }

    async fn read_aggregate(&self, aggregate_id: &str) -> Result<Vec<Event>, EventStoreError> {
        self.read_aggregate_after(aggregate_id, 0).await
    }

    // `sequence` is taken at insert, not at commit. A transaction holding a
    // lower sequence can commit after a higher one is already visible, so
    // across aggregates this is insert order. Within one aggregate the
    // advisory lock serializes writers and sequence follows version.
    async fn read_all(&self) -> Result<Vec<Event>, EventStoreError> {
        self.fetch(
            r#"
            SELECT id, aggregate_id, version, event_type, event_data, created_at
            FROM events
            ORDER BY sequence ASC
            "#,
            None,
            0,
        )
        .await
    }

    async fn current_version(&self, aggregate_id: &str) -> Result<i64, EventStoreError> {
        let version: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(version)
    }

    async fn read_aggregate_after(
        &self,
        aggregate_id: &str,
        after_version: i64,
    ) -> Result<Vec<Event>, EventStoreError> {
        self.fetch(
            r#"
            SELECT id, aggregate_id, version, event_type, event_data, created_at
            FROM events
            WHERE aggregate_id = $1 AND version > $2
            ORDER BY version ASC
            "#,
            Some(aggregate_id),
            after_version,
        )
        .await
    }
}

/// A unique violation means another writer took the version first.
fn map_insert_error(err: sqlx::Error, aggregate_id: &str, expected: i64) -> EventStoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return EventStoreError::ConcurrencyConflict {
                aggregate_id: aggregate_id.to_string(),
                expected,
                // At least one newer event exists; its exact version is unknown here.
                actual: expected + 1,
            };
        }
    }
    EventStoreError::Database(err)
}
