//! In-memory Event Log
//!
//! Keeps every event in a vector with a per-aggregate index. Used by tests,
//! local development, and `LEDGER_STORAGE=memory`.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::Event;

use super::log::{check_expected_version, validate_batch};
use super::{EventLog, EventStoreError};

/// In-memory event log
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Global append order
    events: Vec<Event>,
    /// Aggregate id -> positions in `events`
    streams: HashMap<String, Vec<usize>>,
}

impl Inner {
    fn current_version(&self, aggregate_id: &str) -> i64 {
        self.streams
            .get(aggregate_id)
            .and_then(|positions| positions.last())
            .map(|&pos| self.events[pos].version)
            .unwrap_or(0)
    }
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events stored across all aggregates
    pub async fn len(&self) -> usize {
        self.inner.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl EventLog for InMemoryEventLog {
    async fn append_conditional(
        &self,
        aggregate_id: &str,
        expected_version: i64,
        events: &[Event],
    ) -> Result<(), EventStoreError> {
        validate_batch(aggregate_id, expected_version, events)?;

        // Check and append under one write lock.
        let mut inner = self.inner.write().await;
        let actual = inner.current_version(aggregate_id);
        check_expected_version(aggregate_id, expected_version, actual)?;

        for event in events {
            let position = inner.events.len();
            inner.events.push(event.clone());
            inner
                .streams
                .entry(aggregate_id.to_string())
                .or_default()
                .push(position);
        }

        tracing::debug!(
            aggregate_id,
            expected_version,
            appended = events.len(),
            "events appended to in-memory log"
        );

        Ok(())
    }

    async fn read_aggregate(&self, aggregate_id: &str) -> Result<Vec<Event>, EventStoreError> {
        let inner = self.inner.read().await;
        let events = inner
            .streams
            .get(aggregate_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&pos| inner.events[pos].clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    async fn read_all(&self) -> Result<Vec<Event>, EventStoreError> {
        Ok(self.inner.read().await.events.clone())
    }

    async fn current_version(&self, aggregate_id: &str) -> Result<i64, EventStoreError> {
        Ok(self.inner.read().await.current_version(aggregate_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountEvent;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn deposit(aggregate_id: &str, version: i64) -> Event {
        Event::new(
            aggregate_id,
            version,
            AccountEvent::MoneyDeposited { amount: dec!(1) },
        )
    }

    #[tokio::test]
    async fn test_append_and_read() {
        let log = InMemoryEventLog::new();

        log.append_conditional("a", 0, &[deposit("a", 1), deposit("a", 2)])
            .await
            .unwrap();
        log.append_conditional("b", 0, &[deposit("b", 1)]).await.unwrap();
        log.append_conditional("a", 2, &[deposit("a", 3)]).await.unwrap();

        let a = log.read_aggregate("a").await.unwrap();
        let versions: Vec<i64> = a.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);

        let all = log.read_all().await.unwrap();
        let order: Vec<(&str, i64)> = all
            .iter()
            .map(|e| (e.aggregate_id.as_str(), e.version))
            .collect();
        assert_eq!(order, vec![("a", 1), ("a", 2), ("b", 1), ("a", 3)]);

        assert_eq!(log.current_version("a").await.unwrap(), 3);
        assert_eq!(log.current_version("missing").await.unwrap(), 0);
        assert!(log.read_aggregate("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_expected_version_conflicts() {
        let log = InMemoryEventLog::new();
        log.append_conditional("a", 0, &[deposit("a", 1)]).await.unwrap();

        let err = log
            .append_conditional("a", 0, &[deposit("a", 1)])
            .await
            .unwrap_err();
        assert!(err.is_concurrency_conflict());
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_read_aggregate_after() {
        let log = InMemoryEventLog::new();
        let batch: Vec<Event> = (1..=5).map(|v| deposit("a", v)).collect();
        log.append_conditional("a", 0, &batch).await.unwrap();

        let tail = log.read_aggregate_after("a", 3).await.unwrap();
        let versions: Vec<i64> = tail.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_have_one_winner() {
        let log = Arc::new(InMemoryEventLog::new());
        log.append_conditional("a", 0, &[deposit("a", 1)]).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let log = Arc::clone(&log);
            tasks.push(tokio::spawn(async move {
                log.append_conditional("a", 1, &[deposit("a", 2), deposit("a", 3)])
                    .await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => wins += 1,
                Err(e) if e.is_concurrency_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);

        let versions: Vec<i64> = log
            .read_aggregate("a")
            .await
            .unwrap()
            .iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }
}
