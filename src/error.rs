//! Error handling module
//!
//! Centralized error type returned by the ledger's public operations.

use std::fmt;

use crate::domain::DomainError;
use crate::event_store::EventStoreError;

/// Ledger-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // Business rule violations
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Another writer appended first. Re-read state and run the whole
    /// command again; never retry the raw append.
    #[error("Concurrency conflict for account {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: String,
        expected: i64,
        actual: i64,
    },

    // Storage failures (disk, database, corrupt records)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Flat error taxonomy for callers that map errors to responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    Closed,
    InsufficientFunds,
    BalanceNotZero,
    InvalidArgument,
    ConcurrencyConflict,
    StorageUnavailable,
}

impl ErrorKind {
    /// Stable snake_case code
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Closed => "closed",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::BalanceNotZero => "balance_not_zero",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::StorageUnavailable => "storage_unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Domain(err) => match err {
                DomainError::AlreadyExists(_) => ErrorKind::AlreadyExists,
                DomainError::NotFound(_) => ErrorKind::NotFound,
                DomainError::Closed(_) => ErrorKind::Closed,
                DomainError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
                DomainError::BalanceNotZero { .. } => ErrorKind::BalanceNotZero,
                DomainError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            },
            LedgerError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            LedgerError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Only a conflict is worth retrying, and only as a whole command
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict { .. })
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        self.is_retryable()
    }
}

impl From<EventStoreError> for LedgerError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => LedgerError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            EventStoreError::InvalidBatch(msg) => {
                LedgerError::Domain(DomainError::InvalidArgument(msg))
            }
            other => {
                tracing::error!(error = %other, "event store failure");
                LedgerError::StorageUnavailable(other.to_string())
            }
        }
    }
}
