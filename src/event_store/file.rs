//! File Event Log
//!
//! Newline-delimited JSON, one event per line, appended in global order.
//! A single async lock serializes appends and keeps readers out while a
//! batch is being written. An index of last versions per aggregate is
//! built on open so conditional appends don't rescan the file.
//!
//! The check, write, fsync and index update of an append run on a spawned
//! task. Dropping the caller's future can't stop that sequence halfway.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::domain::Event;

use super::log::{check_expected_version, validate_batch};
use super::{EventLog, EventStoreError};

/// Append-only event log backed by a flat file
#[derive(Debug)]
pub struct FileEventLog {
    path: PathBuf,
    writer: Arc<RwLock<Writer>>,
}

#[derive(Debug)]
struct Writer {
    file: File,
    /// Aggregate id -> last recorded version
    versions: HashMap<String, i64>,
    /// Set when a failed batch could not be rolled back. The file may end
    /// in records the index doesn't know about.
    failed: bool,
}

impl FileEventLog {
    /// Open (or create) the log at `path` and index its contents.
    ///
    /// A trailing record cut off by a crash mid-write is dropped from the
    /// file so later appends start on a clean line.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, EventStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let raw = tokio::fs::read_to_string(&path).await?;
        repair_tail(&mut file, &raw).await?;

        let events = parse_lines(&raw)?;
        let mut versions = HashMap::new();
        for event in &events {
            versions.insert(event.aggregate_id.clone(), event.version);
        }

        tracing::info!(
            path = %path.display(),
            events = events.len(),
            aggregates = versions.len(),
            "event log opened"
        );

        Ok(Self {
            path,
            writer: Arc::new(RwLock::new(Writer {
                file,
                versions,
                failed: false,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Event>, EventStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => parse_lines(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Writer {
    fn ensure_usable(&self) -> Result<(), EventStoreError> {
        if self.failed {
            return Err(EventStoreError::Unavailable(
                "event log holds an unrolled partial batch; reopen it to repair".to_string(),
            ));
        }
        Ok(())
    }

    fn version_of(&self, aggregate_id: &str) -> i64 {
        self.versions.get(aggregate_id).copied().unwrap_or(0)
    }

    /// Write the batch in one call and fsync; roll the file back on failure.
    async fn write_batch(&mut self, buf: &[u8]) -> Result<(), EventStoreError> {
        let len_before = self.file.metadata().await?.len();

        let result = async {
            self.file.write_all(buf).await?;
            self.file.flush().await?;
            self.file.sync_data().await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "event batch write failed, truncating partial record");
            if let Err(rollback) = self.file.set_len(len_before).await {
                tracing::error!(error = %rollback, "failed to roll back partial event batch, log marked failed");
                self.failed = true;
            }
            return Err(e.into());
        }

        Ok(())
    }
}

impl EventLog for FileEventLog {
    async fn append_conditional(
        &self,
        aggregate_id: &str,
        expected_version: i64,
        events: &[Event],
    ) -> Result<(), EventStoreError> {
        validate_batch(aggregate_id, expected_version, events)?;

        let mut buf = String::new();
        for event in events {
            buf.push_str(&serde_json::to_string(event)?);
            buf.push('\n');
        }
        let last_version = events.last().map(|event| event.version);

        let writer = Arc::clone(&self.writer);
        let id = aggregate_id.to_string();
        let task = tokio::spawn(async move {
            let mut writer = writer.write_owned().await;
            writer.ensure_usable()?;
            check_expected_version(&id, expected_version, writer.version_of(&id))?;

            let Some(last) = last_version else {
                return Ok(());
            };
            writer.write_batch(buf.as_bytes()).await?;
            writer.versions.insert(id, last);
            Ok::<(), EventStoreError>(())
        });

        task.await
            .map_err(|e| EventStoreError::Unavailable(format!("append task failed: {e}")))??;

        tracing::debug!(
            aggregate_id,
            expected_version,
            appended = events.len(),
            "events appended to file log"
        );

        Ok(())
    }

    async fn read_aggregate(&self, aggregate_id: &str) -> Result<Vec<Event>, EventStoreError> {
        let writer = self.writer.read().await;
        writer.ensure_usable()?;
        let mut events = self.load().await?;
        events.retain(|event| event.aggregate_id == aggregate_id);
        Ok(events)
    }

    async fn read_all(&self) -> Result<Vec<Event>, EventStoreError> {
        let writer = self.writer.read().await;
        writer.ensure_usable()?;
        self.load().await
    }

    async fn current_version(&self, aggregate_id: &str) -> Result<i64, EventStoreError> {
        let writer = self.writer.read().await;
        writer.ensure_usable()?;
        Ok(writer.version_of(aggregate_id))
    }
}

/// Make sure the file ends on a record boundary.
async fn repair_tail(file: &mut File, raw: &str) -> Result<(), EventStoreError> {
    if raw.is_empty() || raw.ends_with('\n') {
        return Ok(());
    }

    let boundary = raw.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
    let fragment = &raw[boundary..];

    if serde_json::from_str::<Event>(fragment).is_ok() {
        // Complete record, only the newline is missing.
        file.write_all(b"\n").await?;
    } else {
        tracing::warn!(
            bytes = fragment.len(),
            "dropping truncated trailing event record"
        );
        file.set_len(boundary as u64).await?;
    }
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

/// Decode every line; a truncated last line is skipped, any other bad line
/// is an error.
fn parse_lines(raw: &str) -> Result<Vec<Event>, EventStoreError> {
    let complete = raw.is_empty() || raw.ends_with('\n');
    let total = raw.lines().count();
    let mut events = Vec::with_capacity(total);

    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Event>(line) {
            Ok(event) => events.push(event),
            Err(source) if !complete && idx + 1 == total => {
                tracing::warn!(line = idx + 1, error = %source, "ignoring truncated trailing event record");
            }
            Err(source) => {
                return Err(EventStoreError::CorruptRecord {
                    line: idx + 1,
                    source,
                })
            }
        }
    }

    Ok(events)
}
