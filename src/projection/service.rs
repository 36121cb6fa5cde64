//! Projection Service
//!
//! Keeps the account read model up to date from events.
//! This is the "P" in CQRS - projections for queries.

use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::aggregate::{AccountState, Aggregate};
use crate::domain::Event;
use crate::event_store::{EventLog, EventStoreError};

type Table = BTreeMap<String, AccountState>;

/// Result of applying a batch of events to the read model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Events folded into a record
    pub applied: usize,
    /// Events at or below the record's version, skipped
    pub duplicates: usize,
    /// Aggregates that received an event beyond `version + 1`
    pub gaps: Vec<String>,
}

impl ApplyOutcome {
    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }

    fn note_gap(&mut self, aggregate_id: &str) {
        if !self.gaps.iter().any(|id| id == aggregate_id) {
            self.gaps.push(aggregate_id.to_string());
        }
    }
}

/// Projection Service owning the account read model
#[derive(Debug, Default)]
pub struct ProjectionService {
    table: RwLock<Table>,
}

impl ProjectionService {
    /// Create an empty read model
    pub fn new() -> Self {
        Self::default()
    }

    // Lock guards never span an await, so a poisoned lock only means a
    // panic happened mid-apply; the table itself is still usable.
    fn read_table(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Rebuild
    // =========================================================================

    /// Rebuild the read model by folding the whole log from empty.
    ///
    /// Records that a concurrent `apply` already moved past the rebuilt
    /// version are kept, so no record ever moves backwards. A record whose
    /// aggregate has no events in the log at all is dropped.
    pub async fn rebuild_all<L: EventLog>(&self, log: &L) -> Result<usize, EventStoreError> {
        let events = log.read_all().await?;

        let mut fresh = Table::new();
        for event in &events {
            fresh
                .entry(event.aggregate_id.clone())
                .or_insert_with(|| AccountState::new(event.aggregate_id.clone()))
                .apply(event);
        }

        // Records the fold didn't produce survive only if the log has
        // events for them by now.
        let unseen: Vec<String> = self
            .read_table()
            .keys()
            .filter(|id| !fresh.contains_key(*id))
            .cloned()
            .collect();
        let mut orphaned = HashSet::new();
        for id in unseen {
            if log.current_version(&id).await? == 0 {
                orphaned.insert(id);
            }
        }

        let mut table = self.write_table();
        for (id, current) in table.iter() {
            let keep = match fresh.get(id) {
                Some(rebuilt) => current.version() > rebuilt.version(),
                None => !orphaned.contains(id),
            };
            if keep {
                fresh.insert(id.clone(), current.clone());
            } else if !fresh.contains_key(id) {
                tracing::warn!(aggregate_id = %id, "dropping projection with no events in the log");
            }
        }
        *table = fresh;

        tracing::info!(
            events = events.len(),
            accounts = table.len(),
            "projections rebuilt"
        );

        Ok(events.len())
    }

    // =========================================================================
    // Apply
    // =========================================================================

    /// Apply events version-gated.
    ///
    /// An event at or below the record's version is a duplicate and skipped.
    /// An event more than one ahead is a gap: it is not applied and the
    /// aggregate is reported so the caller can `refresh` it.
    pub fn apply(&self, events: &[Event]) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let mut table = self.write_table();

        for event in events {
            let record = table
                .entry(event.aggregate_id.clone())
                .or_insert_with(|| AccountState::new(event.aggregate_id.clone()));

            if event.version <= record.version() {
                outcome.duplicates += 1;
            } else if event.version > record.version() + 1 {
                tracing::warn!(
                    aggregate_id = %event.aggregate_id,
                    projected = record.version(),
                    received = event.version,
                    "projection gap"
                );
                outcome.note_gap(&event.aggregate_id);
            } else {
                record.apply(event);
                outcome.applied += 1;
            }
        }

        // Don't leave placeholder records behind for aggregates whose only
        // events were gaps.
        table.retain(|_, record| record.version() > 0);

        outcome
    }

    /// Re-read one aggregate from the log and apply whatever is missing
    pub async fn refresh<L: EventLog>(
        &self,
        log: &L,
        aggregate_id: &str,
    ) -> Result<ApplyOutcome, EventStoreError> {
        let events = log.read_aggregate(aggregate_id).await?;
        let outcome = self.apply(&events);

        tracing::debug!(
            aggregate_id,
            applied = outcome.applied,
            "projection refreshed"
        );

        Ok(outcome)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get(&self, aggregate_id: &str) -> Option<AccountState> {
        self.read_table().get(aggregate_id).cloned()
    }

    /// All records, ordered by account id
    pub fn get_all(&self) -> Vec<AccountState> {
        self.read_table().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_table().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::reconstruct;
    use crate::domain::AccountEvent;
    use crate::event_store::InMemoryEventLog;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn opened(id: &str, balance: Decimal) -> Event {
        Event::new(
            id,
            1,
            AccountEvent::AccountOpened {
                owner: "alice".to_string(),
                initial_balance: balance,
            },
        )
    }

    fn deposited(id: &str, version: i64, amount: Decimal) -> Event {
        Event::new(id, version, AccountEvent::MoneyDeposited { amount })
    }

    #[test]
    fn test_apply_is_idempotent() {
        let service = ProjectionService::new();
        let events = vec![opened("a", dec!(100)), deposited("a", 2, dec!(50))];

        let first = service.apply(&events);
        assert_eq!(first.applied, 2);
        assert_eq!(first.duplicates, 0);

        let second = service.apply(&events);
        assert_eq!(second.applied, 0);
        assert_eq!(second.duplicates, 2);

        let record = service.get("a").unwrap();
        assert_eq!(record.balance(), dec!(150));
        assert_eq!(record.version(), 2);
    }

    #[test]
    fn test_gap_is_reported_not_applied() {
        let service = ProjectionService::new();
        service.apply(&[opened("a", dec!(10))]);

        let outcome = service.apply(&[deposited("a", 3, dec!(5))]);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.gaps, vec!["a".to_string()]);
        assert_eq!(service.get("a").unwrap().version(), 1);

        // Unknown aggregate starting past version 1 leaves no record.
        let outcome = service.apply(&[deposited("b", 2, dec!(5))]);
        assert!(outcome.has_gaps());
        assert!(service.get("b").is_none());
    }

    #[tokio::test]
    async fn test_refresh_repairs_gap() {
        let log = InMemoryEventLog::new();
        let events = vec![
            opened("a", dec!(10)),
            deposited("a", 2, dec!(5)),
            deposited("a", 3, dec!(1)),
        ];
        log.append_conditional("a", 0, &events).await.unwrap();

        let service = ProjectionService::new();
        service.apply(&events[..1]);
        assert!(service.apply(&events[2..]).has_gaps());

        let outcome = service.refresh(&log, "a").await.unwrap();
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(service.get("a").unwrap().balance(), dec!(16));
    }

    #[tokio::test]
    async fn test_rebuild_matches_single_fold() {
        let log = InMemoryEventLog::new();
        log.append_conditional("b", 0, &[opened("b", dec!(1))])
            .await
            .unwrap();
        log.append_conditional("a", 0, &[opened("a", dec!(2))])
            .await
            .unwrap();
        log.append_conditional("a", 1, &[deposited("a", 2, dec!(3))])
            .await
            .unwrap();

        let service = ProjectionService::new();
        let folded = service.rebuild_all(&log).await.unwrap();
        assert_eq!(folded, 3);

        let all = log.read_all().await.unwrap();
        let expected_a = reconstruct("a", all.iter().filter(|e| e.aggregate_id == "a"));
        assert_eq!(service.get("a").unwrap(), expected_a);

        let ids: Vec<String> = service
            .get_all()
            .iter()
            .map(|state| state.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_rebuild_keeps_records_that_are_ahead() {
        let log = InMemoryEventLog::new();
        log.append_conditional("a", 0, &[opened("a", dec!(2))])
            .await
            .unwrap();

        let service = ProjectionService::new();
        // Simulates an append applied while the rebuild was reading.
        service.apply(&[opened("a", dec!(2)), deposited("a", 2, dec!(8))]);

        service.rebuild_all(&log).await.unwrap();
        let record = service.get("a").unwrap();
        assert_eq!(record.version(), 2);
        assert_eq!(record.balance(), dec!(10));
    }

    #[tokio::test]
    async fn test_rebuild_drops_records_missing_from_log() {
        let log = InMemoryEventLog::new();
        log.append_conditional("a", 0, &[opened("a", dec!(2))])
            .await
            .unwrap();

        let service = ProjectionService::new();
        // Applied from a batch that never reached this log.
        service.apply(&[opened("ghost", dec!(5)), deposited("ghost", 2, dec!(1))]);
        assert!(service.get("ghost").is_some());

        service.rebuild_all(&log).await.unwrap();
        assert!(service.get("ghost").is_none());
        assert_eq!(service.len(), 1);
        assert_eq!(service.get("a").unwrap().balance(), dec!(2));
    }

    #[tokio::test]
    async fn test_rebuild_of_empty_log() {
        let service = ProjectionService::new();
        let folded = service.rebuild_all(&InMemoryEventLog::new()).await.unwrap();

        assert_eq!(folded, 0);
        assert!(service.is_empty());
    }
}
