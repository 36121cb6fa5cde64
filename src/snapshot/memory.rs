//! In-memory snapshot store

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{accept, Snapshot, SnapshotError, SnapshotStore};

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, aggregate_id: &str) -> Option<Snapshot> {
        let snapshot = self.snapshots.read().await.get(aggregate_id).cloned()?;
        accept(aggregate_id, snapshot)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.aggregate_id.clone(), snapshot.clone());
        Ok(())
    }
}
