//! Account Aggregate
//!
//! Account is the core aggregate for managing balances.
//! It folds events into current state and decides which event a command
//! produces. The same fold feeds the projection read model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AccountEvent, Amount, DomainError, Event};

use super::Aggregate;

/// Account state, derived from events and never stored as truth.
///
/// Also the shape of a projection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    /// Account ID (aggregate identity)
    id: String,

    /// Owner name, set by `AccountOpened`
    owner: Option<String>,

    /// Current balance
    balance: Decimal,

    /// Version of the last applied event, 0 if none
    version: i64,

    /// Terminal flag set by `AccountClosed`
    closed: bool,
}

/// Rebuild the state of `id` from its ordered events.
///
/// Pure: the same sequence always yields the same state.
pub fn reconstruct<'a, I>(id: impl Into<String>, events: I) -> AccountState
where
    I: IntoIterator<Item = &'a Event>,
{
    AccountState::new(id).fold(events)
}

impl AccountState {
    /// Zero state for an account with no events
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: None,
            balance: Decimal::ZERO,
            version: 0,
            closed: false,
        }
    }

    /// Fold a sequence of events on top of this state
    pub fn fold<'a, I>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = &'a Event>,
    {
        for event in events {
            self.apply(event);
        }
        self
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Open the account. Only valid while no events exist.
    pub fn open(&self, owner: &str, initial_balance: Amount) -> Result<AccountEvent, DomainError> {
        if self.exists() {
            return Err(DomainError::AlreadyExists(self.id.clone()));
        }
        if owner.trim().is_empty() {
            return Err(DomainError::invalid_argument("owner must not be empty"));
        }

        Ok(AccountEvent::AccountOpened {
            owner: owner.to_string(),
            initial_balance: initial_balance.value(),
        })
    }

    /// Deposit money into an open account
    pub fn deposit(&self, amount: Amount) -> Result<AccountEvent, DomainError> {
        self.ensure_active()?;

        Ok(AccountEvent::MoneyDeposited {
            amount: amount.value(),
        })
    }

    /// Withdraw money; the balance must cover the amount
    pub fn withdraw(&self, amount: Amount) -> Result<AccountEvent, DomainError> {
        self.ensure_active()?;

        if !amount.is_covered_by(self.balance) {
            return Err(DomainError::insufficient_funds(amount.value(), self.balance));
        }

        Ok(AccountEvent::MoneyWithdrawn {
            amount: amount.value(),
        })
    }

    /// Close an empty account. Closing an already closed account is
    /// accepted and records another `AccountClosed`.
    pub fn close(&self) -> Result<AccountEvent, DomainError> {
        if !self.exists() {
            return Err(DomainError::NotFound(self.id.clone()));
        }

        if !self.balance.is_zero() {
            return Err(DomainError::BalanceNotZero {
                balance: self.balance,
            });
        }

        Ok(AccountEvent::AccountClosed)
    }

    /// Wrap a payload into the next event of this aggregate
    pub fn next_event(&self, payload: AccountEvent) -> Event {
        Event::new(self.id.clone(), self.version + 1, payload)
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::NotFound(self.id.clone()));
        }
        if self.closed {
            return Err(DomainError::Closed(self.id.clone()));
        }
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True once at least one event has been applied
    pub fn exists(&self) -> bool {
        self.version > 0
    }

    /// Only reachable through a log that holds events no handler would write
    pub fn is_overdrawn(&self) -> bool {
        self.balance.is_sign_negative() && !self.balance.is_zero()
    }
}

impl Aggregate for AccountState {
    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Event) {
        match &event.payload {
            AccountEvent::AccountOpened {
                owner,
                initial_balance,
            } => {
                self.owner = Some(owner.clone());
                self.balance = *initial_balance;
                self.closed = false;
            }

            // Saturating: a snapshot balance isn't bounded like event amounts.
            AccountEvent::MoneyDeposited { amount } => {
                self.balance = self.balance.saturating_add(*amount);
            }

            AccountEvent::MoneyWithdrawn { amount } => {
                self.balance = self.balance.saturating_sub(*amount);
            }

            AccountEvent::AccountClosed => {
                self.closed = true;
            }

            // Forward compatibility: unknown facts only move the version.
            AccountEvent::Unrecognized { .. } => {}
        }

        // The log numbers events; never count them here.
        self.version = event.version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn opened(state: &AccountState, owner: &str, initial: Decimal) -> Event {
        state.next_event(state.open(owner, amount(initial)).unwrap())
    }

    #[test]
    fn test_zero_state() {
        let state = reconstruct("acc-1", std::iter::empty::<&Event>());

        assert_eq!(state.id(), "acc-1");
        assert_eq!(state.owner(), None);
        assert_eq!(state.balance(), Decimal::ZERO);
        assert_eq!(state.version(), 0);
        assert!(!state.is_closed());
        assert!(!state.exists());
    }

    #[test]
    fn test_account_lifecycle() {
        let mut events = Vec::new();
        let state = AccountState::new("acc-1");

        events.push(opened(&state, "alice", dec!(100)));
        let state = reconstruct("acc-1", &events);
        assert_eq!(state.balance(), dec!(100));
        assert_eq!(state.version(), 1);
        assert_eq!(state.owner(), Some("alice"));

        events.push(state.next_event(state.deposit(amount(dec!(50))).unwrap()));
        let state = reconstruct("acc-1", &events);
        assert_eq!(state.balance(), dec!(150));
        assert_eq!(state.version(), 2);

        let err = state.withdraw(amount(dec!(200))).unwrap_err();
        assert_eq!(err, DomainError::insufficient_funds(dec!(200), dec!(150)));

        events.push(state.next_event(state.withdraw(amount(dec!(150))).unwrap()));
        let state = reconstruct("acc-1", &events);
        assert_eq!(state.balance(), Decimal::ZERO);
        assert_eq!(state.version(), 3);

        events.push(state.next_event(state.close().unwrap()));
        let state = reconstruct("acc-1", &events);
        assert!(state.is_closed());
        assert_eq!(state.version(), 4);

        assert_eq!(
            state.deposit(amount(dec!(1))),
            Err(DomainError::Closed("acc-1".to_string()))
        );
    }

    #[test]
    fn test_close_on_closed_account_is_accepted() {
        let state = AccountState::new("acc-1");
        let open = opened(&state, "alice", Decimal::ZERO);
        let state = reconstruct("acc-1", [&open]);
        let close = state.next_event(state.close().unwrap());
        let state = reconstruct("acc-1", [&open, &close]);

        assert_eq!(state.close(), Ok(AccountEvent::AccountClosed));
        let again = state.next_event(AccountEvent::AccountClosed);
        let state = reconstruct("acc-1", [&open, &close, &again]);
        assert!(state.is_closed());
        assert_eq!(state.version(), 3);
    }

    #[test]
    fn test_reconstruct_is_deterministic() {
        let state = AccountState::new("acc-1");
        let first = opened(&state, "alice", dec!(10));
        let state = reconstruct("acc-1", [&first]);
        let second = state.next_event(state.deposit(amount(dec!(2.5))).unwrap());
        let events = vec![first, second];

        assert_eq!(reconstruct("acc-1", &events), reconstruct("acc-1", &events));
    }

    #[test]
    fn test_version_taken_from_event() {
        let event = Event::new(
            "acc-1",
            7,
            AccountEvent::MoneyDeposited { amount: dec!(1) },
        );

        let state = reconstruct("acc-1", [&event]);
        assert_eq!(state.version(), 7);
    }

    #[test]
    fn test_unrecognized_event_advances_version_only() {
        let state = AccountState::new("acc-1");
        let open = opened(&state, "alice", dec!(20));
        let unknown = Event::new(
            "acc-1",
            2,
            AccountEvent::Unrecognized {
                event_type: "AccountFrozen".to_string(),
                data: json!({ "reason": "review" }),
            },
        );

        let state = reconstruct("acc-1", [&open, &unknown]);
        assert_eq!(state.version(), 2);
        assert_eq!(state.balance(), dec!(20));
        assert!(!state.is_closed());
    }

    #[test]
    fn test_decisions_on_missing_account() {
        let state = AccountState::new("ghost");

        assert_eq!(
            state.deposit(Amount::ZERO),
            Err(DomainError::NotFound("ghost".to_string()))
        );
        assert_eq!(
            state.withdraw(Amount::ZERO),
            Err(DomainError::NotFound("ghost".to_string()))
        );
        assert_eq!(
            state.close(),
            Err(DomainError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_open_twice_rejected() {
        let state = AccountState::new("acc-1");
        let state = reconstruct("acc-1", [&opened(&state, "alice", Decimal::ZERO)]);

        assert_eq!(
            state.open("bob", Amount::ZERO),
            Err(DomainError::AlreadyExists("acc-1".to_string()))
        );
    }

    #[test]
    fn test_open_requires_owner() {
        let state = AccountState::new("acc-1");
        assert!(matches!(
            state.open("  ", Amount::ZERO),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_close_requires_zero_balance() {
        let state = AccountState::new("acc-1");
        let state = reconstruct("acc-1", [&opened(&state, "alice", dec!(5))]);

        assert_eq!(
            state.close(),
            Err(DomainError::BalanceNotZero { balance: dec!(5) })
        );
    }

    #[test]
    fn test_overdrawn_replay_is_not_clamped() {
        let state = AccountState::new("acc-1");
        let open = opened(&state, "alice", dec!(10));
        let withdraw = Event::new(
            "acc-1",
            2,
            AccountEvent::MoneyWithdrawn { amount: dec!(25) },
        );

        let state = reconstruct("acc-1", [&open, &withdraw]);
        assert_eq!(state.balance(), dec!(-15));
        assert!(state.is_overdrawn());
    }

    #[test]
    fn test_fold_never_overflows() {
        let mut state = AccountState::new("acc-1");
        state.balance = Decimal::MAX;
        state.apply(&Event::new(
            "acc-1",
            1,
            AccountEvent::MoneyDeposited { amount: dec!(1) },
        ));
        assert_eq!(state.balance(), Decimal::MAX);

        state.balance = Decimal::MIN;
        state.apply(&Event::new(
            "acc-1",
            2,
            AccountEvent::MoneyWithdrawn { amount: dec!(1) },
        ));
        assert_eq!(state.balance(), Decimal::MIN);
    }

    #[test]
    fn test_should_snapshot() {
        let mut state = AccountState::new("acc-1");

        assert!(!state.should_snapshot(100));

        state.version = 100;
        assert!(state.should_snapshot(100));
        assert!(!state.should_snapshot(0));

        state.version = 99;
        assert!(!state.should_snapshot(100));

        state.version = 200;
        assert!(state.should_snapshot(100));
    }
}
