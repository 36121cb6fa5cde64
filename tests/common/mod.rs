//! Common test utilities
#![allow(dead_code)]

use std::path::Path;

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use ledger::event_store::FileEventLog;
use ledger::snapshot::FileSnapshotStore;
use ledger::{AccountEvent, Event, Ledger};

pub type FileLedger = Ledger<FileEventLog, FileSnapshotStore>;

/// Ledger over an event log and snapshot file inside `dir`
pub async fn file_ledger(dir: &Path, snapshot_interval: i64) -> FileLedger {
    let log = FileEventLog::open(dir.join("events.log"))
        .await
        .expect("Failed to open event log");
    let snapshots = FileSnapshotStore::new(dir.join("snapshots.json"));
    Ledger::new(log, snapshots, snapshot_interval)
}

/// Connect to the test database, or `None` when `DATABASE_URL` is not set
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    ledger::db::ensure_schema(&pool)
        .await
        .expect("Failed to create schema");

    Some(pool)
}

/// Unique aggregate id so tests sharing a database don't collide
pub fn account_id() -> String {
    format!("acc-{}", uuid::Uuid::new_v4())
}

pub fn opened(aggregate_id: &str, initial_balance: Decimal) -> Event {
    Event::new(
        aggregate_id,
        1,
        AccountEvent::AccountOpened {
            owner: "alice".to_string(),
            initial_balance,
        },
    )
}

pub fn deposited(aggregate_id: &str, version: i64, amount: Decimal) -> Event {
    Event::new(aggregate_id, version, AccountEvent::MoneyDeposited { amount })
}
