//! Database module
//!
//! Connection pool and schema utilities for the PostgreSQL backend.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

const REQUIRED_TABLES: [&str; 2] = ["events", "event_snapshots"];

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS events (
        sequence     BIGSERIAL PRIMARY KEY,
        id           UUID NOT NULL UNIQUE,
        aggregate_id TEXT NOT NULL,
        version      BIGINT NOT NULL CHECK (version > 0),
        event_type   TEXT NOT NULL,
        event_data   JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (aggregate_id, version)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_aggregate ON events (aggregate_id, version)",
    r#"
    CREATE TABLE IF NOT EXISTS event_snapshots (
        aggregate_type TEXT NOT NULL,
        aggregate_id   TEXT NOT NULL,
        version        BIGINT NOT NULL CHECK (version > 0),
        state          JSONB NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (aggregate_type, aggregate_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_event_snapshots_created ON event_snapshots (created_at)",
];

/// Connect using `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| sqlx::Error::Configuration("DATABASE_URL is not set".into()))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await?;

    tracing::info!(
        max_connections = config.database_max_connections,
        "Database connection established"
    );
    Ok(pool)
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Create the event and snapshot tables if they are missing
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("database schema ensured");
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
