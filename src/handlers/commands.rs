//! Command definitions
//!
//! Commands represent intentions to change the system state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Command to open a new account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAccountCommand {
    pub owner: String,
    /// Defaults to zero
    pub initial_balance: Option<Decimal>,
    /// Generated (UUID v4) when absent
    pub account_id: Option<String>,
}

impl OpenAccountCommand {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            initial_balance: None,
            account_id: None,
        }
    }

    pub fn with_initial_balance(mut self, initial_balance: Decimal) -> Self {
        self.initial_balance = Some(initial_balance);
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}

/// Command to deposit money into an account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositCommand {
    pub account_id: String,
    pub amount: Decimal,
}

impl DepositCommand {
    pub fn new(account_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            amount,
        }
    }
}

/// Command to withdraw money from an account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawCommand {
    pub account_id: String,
    pub amount: Decimal,
}

impl WithdrawCommand {
    pub fn new(account_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            amount,
        }
    }
}

/// Command to close an empty account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseAccountCommand {
    pub account_id: String,
}

impl CloseAccountCommand {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
        }
    }
}
