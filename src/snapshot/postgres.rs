//! PostgreSQL snapshot store (`event_snapshots` table)

use sqlx::PgPool;

use crate::aggregate::{AccountState, Aggregate};

use super::{accept, Snapshot, SnapshotError, SnapshotStore};

#[derive(Debug, Clone)]
pub struct PostgresSnapshotStore {
    pool: PgPool,
}

impl PostgresSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, aggregate_id: &str) -> Result<Option<Snapshot>, SnapshotError> {
        let row: Option<(i64, serde_json::Value, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
            r#"
            SELECT version, state, created_at
            FROM event_snapshots
            WHERE aggregate_type = $1 AND aggregate_id = $2
            "#,
        )
        .bind(AccountState::aggregate_type())
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((version, state, taken_at)) = row else {
            return Ok(None);
        };

        Ok(Some(Snapshot {
            aggregate_id: aggregate_id.to_string(),
            version,
            state: serde_json::from_value(state)?,
            taken_at,
        }))
    }
}

impl SnapshotStore for PostgresSnapshotStore {
    async fn load(&self, aggregate_id: &str) -> Option<Snapshot> {
        match self.fetch(aggregate_id).await {
            Ok(snapshot) => accept(aggregate_id, snapshot?),
            Err(e) => {
                tracing::warn!(aggregate_id, error = %e, "failed to load snapshot; treating as cache miss");
                None
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let state = serde_json::to_value(&snapshot.state)?;

        sqlx::query(
            r#"
            INSERT INTO event_snapshots (aggregate_type, aggregate_id, version, state, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_type, aggregate_id)
            DO UPDATE SET version = $3, state = $4, created_at = $5
            "#,
        )
        .bind(AccountState::aggregate_type())
        .bind(&snapshot.aggregate_id)
        .bind(snapshot.version)
        .bind(state)
        .bind(snapshot.taken_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            aggregate_id = %snapshot.aggregate_id,
            version = snapshot.version,
            "snapshot saved to postgres"
        );

        Ok(())
    }
}
