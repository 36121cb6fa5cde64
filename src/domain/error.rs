//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::AmountError;

/// Business rule violations detected by the command handlers.
///
/// Every variant is recoverable by the caller: surface it to the end user,
/// or fix the input and try again.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// An account with this id already has events
    #[error("Account already exists: {0}")]
    AlreadyExists(String),

    /// No events exist for this account id
    #[error("Account not found: {0}")]
    NotFound(String),

    /// Account is closed and accepts no further money movement
    #[error("Account is closed: {0}")]
    Closed(String),

    /// Withdrawal larger than the current balance
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Only empty accounts can be closed
    #[error("Balance is not zero: {balance}")]
    BalanceNotZero { balance: Decimal },

    /// Malformed command input (negative amount, empty owner, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if the caller's input itself was at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
