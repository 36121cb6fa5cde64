//! Account Handler
//!
//! Runs the account commands: reconstruct state, validate, build the next
//! event, and append it conditionally on the version that was read. After a
//! successful append the projection and snapshot cache are brought forward.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::aggregate::{reconstruct, AccountState, Aggregate};
use crate::domain::{Amount, DomainError, Event};
use crate::error::{LedgerError, LedgerResult};
use crate::event_store::EventLog;
use crate::projection::ProjectionService;
use crate::snapshot::{Snapshot, SnapshotStore};

use super::{CloseAccountCommand, DepositCommand, OpenAccountCommand, WithdrawCommand};

/// Handler for every account command
pub struct AccountHandler<L, S> {
    log: Arc<L>,
    snapshots: Arc<S>,
    projection: Arc<ProjectionService>,
    snapshot_interval: i64,
}

impl<L, S> Clone for AccountHandler<L, S> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            snapshots: Arc::clone(&self.snapshots),
            projection: Arc::clone(&self.projection),
            snapshot_interval: self.snapshot_interval,
        }
    }
}

impl<L: EventLog, S: SnapshotStore> AccountHandler<L, S> {
    pub fn new(
        log: Arc<L>,
        snapshots: Arc<S>,
        projection: Arc<ProjectionService>,
        snapshot_interval: i64,
    ) -> Self {
        Self {
            log,
            snapshots,
            projection,
            snapshot_interval,
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Open a new account
    pub async fn open_account(&self, command: OpenAccountCommand) -> LedgerResult<Vec<Event>> {
        let account_id = command
            .account_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if account_id.trim().is_empty() {
            return Err(DomainError::invalid_argument("account id must not be empty").into());
        }

        let initial_balance = amount(command.initial_balance.unwrap_or(Decimal::ZERO))?;

        let state = self.load_state(&account_id).await?;
        let payload = state.open(&command.owner, initial_balance)?;

        // Losing the race on version 0 means the account was created by
        // someone else.
        match self.commit(&state, vec![state.next_event(payload)]).await {
            Err(LedgerError::ConcurrencyConflict { aggregate_id, .. }) => {
                Err(DomainError::AlreadyExists(aggregate_id).into())
            }
            result => {
                if result.is_ok() {
                    tracing::info!(account_id = %account_id, owner = %command.owner, "account opened");
                }
                result
            }
        }
    }

    /// Deposit money into an account
    pub async fn deposit(&self, command: DepositCommand) -> LedgerResult<Vec<Event>> {
        let amount = amount(command.amount)?;

        let state = self.load_state(&command.account_id).await?;
        let payload = state.deposit(amount)?;

        self.commit(&state, vec![state.next_event(payload)]).await
    }

    /// Withdraw money from an account
    pub async fn withdraw(&self, command: WithdrawCommand) -> LedgerResult<Vec<Event>> {
        let amount = amount(command.amount)?;

        let state = self.load_state(&command.account_id).await?;
        let payload = state.withdraw(amount)?;

        self.commit(&state, vec![state.next_event(payload)]).await
    }

    /// Close an account whose balance is zero
    pub async fn close_account(&self, command: CloseAccountCommand) -> LedgerResult<Vec<Event>> {
        let state = self.load_state(&command.account_id).await?;
        let payload = state.close()?;

        let events = self.commit(&state, vec![state.next_event(payload)]).await?;
        tracing::info!(account_id = %command.account_id, "account closed");
        Ok(events)
    }

    // =========================================================================
    // State loading
    // =========================================================================

    /// Current state of an account, using a snapshot when one lines up
    /// with the log. Unknown ids yield the zero state.
    pub async fn load_state(&self, account_id: &str) -> LedgerResult<AccountState> {
        if let Some(snapshot) = self.snapshots.load(account_id).await {
            let tail = self
                .log
                .read_aggregate_after(account_id, snapshot.version)
                .await?;

            let lines_up = match tail.first() {
                Some(first) => first.version == snapshot.version + 1,
                None => self.log.current_version(account_id).await? == snapshot.version,
            };

            if lines_up {
                tracing::debug!(
                    account_id,
                    snapshot_version = snapshot.version,
                    replayed = tail.len(),
                    "state loaded from snapshot"
                );
                return Ok(checked(snapshot.state.fold(&tail)));
            }

            tracing::warn!(
                account_id,
                snapshot_version = snapshot.version,
                "snapshot does not line up with the log; replaying from the start"
            );
        }

        let events = self.log.read_aggregate(account_id).await?;
        Ok(checked(reconstruct(account_id, &events)))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Append on top of the version `state` was built from, then update the
    /// read side.
    async fn commit(&self, state: &AccountState, events: Vec<Event>) -> LedgerResult<Vec<Event>> {
        self.log
            .append_conditional(state.id(), state.version(), &events)
            .await?;

        tracing::debug!(
            account_id = %state.id(),
            version = state.version() + events.len() as i64,
            "events appended"
        );

        self.project(&events).await;
        self.save_snapshot_if_needed(state.clone().fold(&events))
            .await;

        Ok(events)
    }

    /// Fold fresh events into the projection, repairing any gap from the log
    async fn project(&self, events: &[Event]) {
        let outcome = self.projection.apply(events);

        for aggregate_id in &outcome.gaps {
            if let Err(e) = self.projection.refresh(self.log.as_ref(), aggregate_id).await {
                // The read model catches up on the next refresh or rebuild.
                tracing::warn!(aggregate_id = %aggregate_id, error = %e, "projection refresh failed");
            }
        }
    }

    async fn save_snapshot_if_needed(&self, state: AccountState) {
        if !state.should_snapshot(self.snapshot_interval) {
            return;
        }

        if let Err(e) = self.snapshots.save(&Snapshot::of(&state)).await {
            tracing::warn!(
                account_id = %state.id(),
                version = state.version(),
                error = %e,
                "failed to save snapshot"
            );
        }
    }
}

fn amount(value: Decimal) -> Result<Amount, DomainError> {
    Amount::new(value).map_err(DomainError::from)
}

/// The fold trusts the log; an overdrawn replay is reported, not corrected.
fn checked(state: AccountState) -> AccountState {
    if state.is_overdrawn() {
        tracing::warn!(
            account_id = %state.id(),
            balance = %state.balance(),
            version = state.version(),
            "reconstructed balance is negative"
        );
    }
    state
}
