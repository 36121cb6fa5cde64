//! Runtime-selected Event Log
//!
//! Lets the binaries pick a backend from configuration while the ledger
//! stays generic over [`EventLog`].

use crate::domain::Event;

use super::{EventLog, EventStoreError, FileEventLog, InMemoryEventLog, PostgresEventLog};

/// One of the supported event log backends
#[derive(Debug)]
pub enum EventLogBackend {
    Memory(InMemoryEventLog),
    File(FileEventLog),
    Postgres(PostgresEventLog),
}

impl EventLogBackend {
    pub fn name(&self) -> &'static str {
        match self {
            EventLogBackend::Memory(_) => "memory",
            EventLogBackend::File(_) => "file",
            EventLogBackend::Postgres(_) => "postgres",
        }
    }
}

impl EventLog for EventLogBackend {
    async fn append_conditional(
        &self,
        aggregate_id: &str,
        expected_version: i64,
        events: &[Event],
    ) -> Result<(), EventStoreError> {
        match self {
            EventLogBackend::Memory(log) => {
                log.append_conditional(aggregate_id, expected_version, events)
                    .await
            }
            EventLogBackend::File(log) => {
                log.append_conditional(aggregate_id, expected_version, events)
                    .await
            }
            EventLogBackend::Postgres(log) => {
                log.append_conditional(aggregate_id, expected_version, events)
                    .await
            }
        }
    }

    async fn read_aggregate(&self, aggregate_id: &str) -> Result<Vec<Event>, EventStoreError> {
        match self {
            EventLogBackend::Memory(log) => log.read_aggregate(aggregate_id).await,
            EventLogBackend::File(log) => log.read_aggregate(aggregate_id).await,
            EventLogBackend::Postgres(log) => log.read_aggregate(aggregate_id).await,
        }
    }

    async fn read_all(&self) -> Result<Vec<Event>, EventStoreError> {
        match self {
            EventLogBackend::Memory(log) => log.read_all().await,
            EventLogBackend::File(log) => log.read_all().await,
            EventLogBackend::Postgres(log) => log.read_all().await,
        }
    }

    async fn current_version(&self, aggregate_id: &str) -> Result<i64, EventStoreError> {
        match self {
            EventLogBackend::Memory(log) => log.current_version(aggregate_id).await,
            EventLogBackend::File(log) => log.current_version(aggregate_id).await,
            EventLogBackend::Postgres(log) => log.current_version(aggregate_id).await,
        }
    }

    async fn read_aggregate_after(
        &self,
        aggregate_id: &str,
        after_version: i64,
    ) -> Result<Vec<Event>, EventStoreError> {
        match self {
            EventLogBackend::Memory(log) => log.read_aggregate_after(aggregate_id, after_version).await,
            EventLogBackend::File(log) => log.read_aggregate_after(aggregate_id, after_version).await,
            EventLogBackend::Postgres(log) => {
                log.read_aggregate_after(aggregate_id, after_version).await
            }
        }
    }
}
