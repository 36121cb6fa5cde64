//! Event Log contract
//!
//! The only storage primitives the ledger relies on: conditional append and
//! full or aggregate-scoped reads. Every backend implements [`EventLog`].

use std::future::Future;

use crate::domain::Event;

use super::EventStoreError;

/// Durable, ordered, append-only store of events keyed by aggregate id.
///
/// # Contract
/// - `append_conditional` checks the last recorded version and appends the
///   whole batch as one atomic unit with respect to other appends to the
///   same aggregate. Either every event lands or none does.
/// - Readers never observe a partially appended batch.
/// - `read_all` returns events in global append order; that is the only
///   total order the log guarantees.
pub trait EventLog: Send + Sync {
    /// Append `events` if the aggregate's last version equals
    /// `expected_version`, otherwise fail with
    /// [`EventStoreError::ConcurrencyConflict`].
    fn append_conditional(
        &self,
        aggregate_id: &str,
        expected_version: i64,
        events: &[Event],
    ) -> impl Future<Output = Result<(), EventStoreError>> + Send;

    /// All events of one aggregate in ascending version order
    fn read_aggregate(
        &self,
        aggregate_id: &str,
    ) -> impl Future<Output = Result<Vec<Event>, EventStoreError>> + Send;

    /// Every event ever appended, in append order
    fn read_all(&self) -> impl Future<Output = Result<Vec<Event>, EventStoreError>> + Send;

    /// Version of the last recorded event, 0 if the aggregate has none
    fn current_version(
        &self,
        aggregate_id: &str,
    ) -> impl Future<Output = Result<i64, EventStoreError>> + Send;

    /// Events of one aggregate newer than `after_version`
    fn read_aggregate_after(
        &self,
        aggregate_id: &str,
        after_version: i64,
    ) -> impl Future<Output = Result<Vec<Event>, EventStoreError>> + Send {
        async move {
            let mut events = self.read_aggregate(aggregate_id).await?;
            events.retain(|event| event.version > after_version);
            Ok(events)
        }
    }
}

/// Reject batches that don't continue `aggregate_id` from `expected_version`.
pub(crate) fn validate_batch(
    aggregate_id: &str,
    expected_version: i64,
    events: &[Event],
) -> Result<(), EventStoreError> {
    if expected_version < 0 {
        return Err(EventStoreError::InvalidBatch(format!(
            "expected version must not be negative (got {expected_version})"
        )));
    }

    for (offset, event) in events.iter().enumerate() {
        if event.aggregate_id != aggregate_id {
            return Err(EventStoreError::InvalidBatch(format!(
                "event {} belongs to aggregate {}, not {}",
                event.id, event.aggregate_id, aggregate_id
            )));
        }

        let wanted = expected_version + 1 + offset as i64;
        if event.version != wanted {
            return Err(EventStoreError::InvalidBatch(format!(
                "event {} has version {}, expected {}",
                event.id, event.version, wanted
            )));
        }

        if let Err(e) = event.payload.check_amounts() {
            return Err(EventStoreError::InvalidBatch(format!(
                "event {} carries an invalid amount: {e}",
                event.id
            )));
        }
    }

    Ok(())
}

/// Optimistic concurrency check
pub(crate) fn check_expected_version(
    aggregate_id: &str,
    expected: i64,
    actual: i64,
) -> Result<(), EventStoreError> {
    if actual != expected {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id: aggregate_id.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountEvent;

    fn closed(aggregate_id: &str, version: i64) -> Event {
        Event::new(aggregate_id, version, AccountEvent::AccountClosed)
    }

    #[test]
    fn test_validate_batch_accepts_contiguous_versions() {
        let events = vec![closed("a", 3), closed("a", 4)];
        assert!(validate_batch("a", 2, &events).is_ok());
        assert!(validate_batch("a", 2, &[]).is_ok());
    }

    #[test]
    fn test_validate_batch_rejects_gap() {
        let events = vec![closed("a", 3), closed("a", 5)];
        let err = validate_batch("a", 2, &events).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidBatch(ref msg) if msg.contains("expected 4")));
    }

    #[test]
    fn test_validate_batch_rejects_foreign_aggregate() {
        let events = vec![closed("b", 1)];
        assert!(matches!(
            validate_batch("a", 0, &events),
            Err(EventStoreError::InvalidBatch(_))
        ));
    }

    #[test]
    fn test_validate_batch_rejects_out_of_range_amount() {
        let events = vec![Event::new(
            "a",
            1,
            AccountEvent::MoneyDeposited {
                amount: rust_decimal::Decimal::MAX,
            },
        )];
        let err = validate_batch("a", 0, &events).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidBatch(ref msg) if msg.contains("invalid amount")));
    }

    #[test]
    fn test_check_expected_version() {
        assert!(check_expected_version("a", 2, 2).is_ok());

        let err = check_expected_version("a", 1, 2).unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::ConcurrencyConflict { expected: 1, actual: 2, .. }
        ));
    }
}
