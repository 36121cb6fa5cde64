//! Event Store Errors
//!
//! Error types for event store operations.

/// Errors that can occur in the event store
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: String,
        expected: i64,
        actual: i64,
    },

    /// Batch doesn't belong to the aggregate or breaks the version sequence
    #[error("Invalid event batch: {0}")]
    InvalidBatch(String),

    /// A stored line could not be decoded
    #[error("Corrupt event record at line {line}: {source}")]
    CorruptRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Backend refused the operation until it is reopened
    #[error("Event log unavailable: {0}")]
    Unavailable(String),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }

    /// Check if this error reports the storage itself being unusable
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            EventStoreError::Io(_)
                | EventStoreError::Unavailable(_)
                | EventStoreError::Database(_)
                | EventStoreError::Serialization(_)
                | EventStoreError::CorruptRecord { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        let conflict = EventStoreError::ConcurrencyConflict {
            aggregate_id: "acc-1".to_string(),
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_concurrency_conflict());
        assert!(!conflict.is_storage_failure());
        assert!(conflict.to_string().contains("expected version 1, found 2"));

        let io = EventStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(!io.is_concurrency_conflict());
        assert!(io.is_storage_failure());
    }
}
