//! File snapshot store
//!
//! All snapshots live in one JSON document keyed by aggregate id. Writes go
//! to a temporary file that is renamed over the original, so readers never
//! see a partially written document.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use super::{accept, Snapshot, SnapshotError, SnapshotStore};

type SnapshotMap = BTreeMap<String, Snapshot>;

#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileSnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document; a missing file is an empty map.
    async fn read_map(&self) -> Result<SnapshotMap, SnapshotError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SnapshotMap::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(SnapshotMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_map(&self, map: &SnapshotMap) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(map)?;
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    async fn load(&self, aggregate_id: &str) -> Option<Snapshot> {
        match self.read_map().await {
            Ok(mut map) => accept(aggregate_id, map.remove(aggregate_id)?),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read snapshots; treating as cache miss"
                );
                None
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let _guard = self.write_lock.lock().await;

        let mut map = match self.read_map().await {
            Ok(map) => map,
            Err(SnapshotError::Serialization(e)) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "discarding unreadable snapshot document"
                );
                SnapshotMap::new()
            }
            Err(e) => return Err(e),
        };

        map.insert(snapshot.aggregate_id.clone(), snapshot.clone());
        self.write_map(&map).await?;

        tracing::info!(
            aggregate_id = %snapshot.aggregate_id,
            version = snapshot.version,
            "snapshot saved"
        );
        Ok(())
    }
}
