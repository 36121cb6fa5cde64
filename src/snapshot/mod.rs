//! Snapshot module
//!
//! Cached aggregate state used to shorten replay. A snapshot is only a
//! hint: loaders fold the log's newer events on top, and any snapshot that
//! can't be read or doesn't line up is treated as missing.

mod file;
mod memory;
mod postgres;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{AccountState, Aggregate};

pub use file::FileSnapshotStore;
pub use memory::InMemorySnapshotStore;
pub use postgres::PostgresSnapshotStore;

/// Aggregate state tagged with the version it represents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub aggregate_id: String,
    pub version: i64,
    pub state: AccountState,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Capture the given state
    pub fn of(state: &AccountState) -> Self {
        Self {
            aggregate_id: state.id().to_string(),
            version: state.version(),
            state: state.clone(),
            taken_at: Utc::now(),
        }
    }

    /// The tag and the embedded state must agree
    pub fn is_consistent(&self) -> bool {
        self.version > 0
            && self.state.version() == self.version
            && self.state.id() == self.aggregate_id
    }
}

/// Errors raised while saving snapshots
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage for snapshots.
///
/// `load` never fails: unreadable or corrupt entries come back as `None`
/// so callers fall back to full replay.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, aggregate_id: &str) -> impl Future<Output = Option<Snapshot>> + Send;

    fn save(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), SnapshotError>> + Send;
}

/// Snapshotting switched off
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSnapshots;

impl SnapshotStore for NoSnapshots {
    async fn load(&self, _aggregate_id: &str) -> Option<Snapshot> {
        None
    }

    async fn save(&self, _snapshot: &Snapshot) -> Result<(), SnapshotError> {
        Ok(())
    }
}

/// One of the supported snapshot backends
#[derive(Debug)]
pub enum SnapshotBackend {
    Disabled(NoSnapshots),
    Memory(InMemorySnapshotStore),
    File(FileSnapshotStore),
    Postgres(PostgresSnapshotStore),
}

impl SnapshotBackend {
    pub fn name(&self) -> &'static str {
        match self {
            SnapshotBackend::Disabled(_) => "disabled",
            SnapshotBackend::Memory(_) => "memory",
            SnapshotBackend::File(_) => "file",
            SnapshotBackend::Postgres(_) => "postgres",
        }
    }
}

impl SnapshotStore for SnapshotBackend {
    async fn load(&self, aggregate_id: &str) -> Option<Snapshot> {
        match self {
            SnapshotBackend::Disabled(store) => store.load(aggregate_id).await,
            SnapshotBackend::Memory(store) => store.load(aggregate_id).await,
            SnapshotBackend::File(store) => store.load(aggregate_id).await,
            SnapshotBackend::Postgres(store) => store.load(aggregate_id).await,
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        match self {
            SnapshotBackend::Disabled(store) => store.save(snapshot).await,
            SnapshotBackend::Memory(store) => store.save(snapshot).await,
            SnapshotBackend::File(store) => store.save(snapshot).await,
            SnapshotBackend::Postgres(store) => store.save(snapshot).await,
        }
    }
}

/// Drop snapshots whose tag disagrees with their contents
pub(crate) fn accept(aggregate_id: &str, snapshot: Snapshot) -> Option<Snapshot> {
    if snapshot.aggregate_id == aggregate_id && snapshot.is_consistent() {
        Some(snapshot)
    } else {
        tracing::warn!(
            aggregate_id,
            snapshot_version = snapshot.version,
            "inconsistent snapshot ignored"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::reconstruct;
    use crate::domain::{AccountEvent, Event};
    use rust_decimal_macros::dec;

    fn state_at_v1(id: &str) -> AccountState {
        let event = Event::new(
            id,
            1,
            AccountEvent::AccountOpened {
                owner: "alice".to_string(),
                initial_balance: dec!(3),
            },
        );
        reconstruct(id, [&event])
    }

    #[test]
    fn test_snapshot_of_state_is_consistent() {
        let snapshot = Snapshot::of(&state_at_v1("a"));
        assert!(snapshot.is_consistent());
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn test_mismatched_tag_rejected() {
        let mut snapshot = Snapshot::of(&state_at_v1("a"));
        snapshot.version = 5;
        assert!(!snapshot.is_consistent());
        assert!(accept("a", snapshot).is_none());

        let snapshot = Snapshot::of(&state_at_v1("a"));
        assert!(accept("b", snapshot).is_none());
    }

    #[tokio::test]
    async fn test_disabled_store_never_returns_anything() {
        let store = NoSnapshots;
        store.save(&Snapshot::of(&state_at_v1("a"))).await.unwrap();
        assert!(store.load("a").await.is_none());
    }
}
