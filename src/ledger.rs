//! Ledger facade
//!
//! Single entry point wiring one event log, one snapshot store and one
//! projection table together. Every write goes through the command handler;
//! reads come either from the log (reconstruction) or from the projection.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::aggregate::AccountState;
use crate::config::{Config, StorageKind};
use crate::db;
use crate::domain::Event;
use crate::error::LedgerResult;
use crate::event_store::{
    EventLog, EventLogBackend, EventStoreError, FileEventLog, InMemoryEventLog, PostgresEventLog,
};
use crate::handlers::{
    AccountHandler, CloseAccountCommand, DepositCommand, OpenAccountCommand, WithdrawCommand,
};
use crate::projection::ProjectionService;
use crate::snapshot::{
    FileSnapshotStore, InMemorySnapshotStore, NoSnapshots, PostgresSnapshotStore,
    SnapshotBackend, SnapshotStore,
};

/// Ledger over the backends chosen by configuration
pub type ConfiguredLedger = Ledger<EventLogBackend, SnapshotBackend>;

/// Errors raised while opening the configured backends
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Event log error: {0}")]
    EventLog(#[from] EventStoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database schema is incomplete")]
    SchemaIncomplete,
}

pub struct Ledger<L, S> {
    log: Arc<L>,
    projection: Arc<ProjectionService>,
    handler: AccountHandler<L, S>,
}

impl<L, S> Clone for Ledger<L, S> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            projection: Arc::clone(&self.projection),
            handler: self.handler.clone(),
        }
    }
}

impl Ledger<InMemoryEventLog, NoSnapshots> {
    /// Volatile ledger without snapshots
    pub fn in_memory() -> Self {
        Self::new(InMemoryEventLog::new(), NoSnapshots, 0)
    }
}

impl ConfiguredLedger {
    /// Open the backends named by `config`. Projections start empty; call
    /// [`Ledger::rebuild_projections`] to populate them from the log.
    pub async fn open(config: &Config) -> Result<Self, StartupError> {
        let (log, snapshots) = match config.storage {
            StorageKind::Memory => (
                EventLogBackend::Memory(InMemoryEventLog::new()),
                SnapshotBackend::Memory(InMemorySnapshotStore::new()),
            ),
            StorageKind::File => (
                EventLogBackend::File(FileEventLog::open(&config.event_log_path).await?),
                SnapshotBackend::File(FileSnapshotStore::new(&config.snapshot_path)),
            ),
            StorageKind::Postgres => {
                let pool = db::connect(config).await?;
                db::ensure_schema(&pool).await?;
                if !db::check_schema(&pool).await? {
                    return Err(StartupError::SchemaIncomplete);
                }
                (
                    EventLogBackend::Postgres(PostgresEventLog::new(pool.clone())),
                    SnapshotBackend::Postgres(PostgresSnapshotStore::new(pool)),
                )
            }
        };

        let snapshots = if config.snapshots_enabled() {
            snapshots
        } else {
            SnapshotBackend::Disabled(NoSnapshots)
        };

        tracing::info!(
            event_log = log.name(),
            snapshots = snapshots.name(),
            snapshot_interval = config.snapshot_interval,
            "ledger opened"
        );

        Ok(Self::new(log, snapshots, config.snapshot_interval))
    }
}

impl<L: EventLog, S: SnapshotStore> Ledger<L, S> {
    /// Wire a ledger over the given backends. `snapshot_interval == 0`
    /// disables snapshot saves.
    pub fn new(log: L, snapshots: S, snapshot_interval: i64) -> Self {
        let log = Arc::new(log);
        let projection = Arc::new(ProjectionService::new());
        let handler = AccountHandler::new(
            Arc::clone(&log),
            Arc::new(snapshots),
            Arc::clone(&projection),
            snapshot_interval,
        );

        Self {
            log,
            projection,
            handler,
        }
    }

    pub fn event_log(&self) -> &L {
        &self.log
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub async fn open_account(
        &self,
        owner: &str,
        initial_balance: Option<Decimal>,
        account_id: Option<&str>,
    ) -> LedgerResult<Vec<Event>> {
        let mut command = OpenAccountCommand::new(owner);
        if let Some(initial_balance) = initial_balance {
            command = command.with_initial_balance(initial_balance);
        }
        if let Some(account_id) = account_id {
            command = command.with_account_id(account_id);
        }
        self.handler.open_account(command).await
    }

    pub async fn deposit(&self, account_id: &str, amount: Decimal) -> LedgerResult<Vec<Event>> {
        self.handler
            .deposit(DepositCommand::new(account_id, amount))
            .await
    }

    pub async fn withdraw(&self, account_id: &str, amount: Decimal) -> LedgerResult<Vec<Event>> {
        self.handler
            .withdraw(WithdrawCommand::new(account_id, amount))
            .await
    }

    pub async fn close_account(&self, account_id: &str) -> LedgerResult<Vec<Event>> {
        self.handler
            .close_account(CloseAccountCommand::new(account_id))
            .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Authoritative state, reconstructed from the log
    pub async fn account_state(&self, account_id: &str) -> LedgerResult<AccountState> {
        self.handler.load_state(account_id).await
    }

    /// Read-model record; may trail the log
    pub fn projection(&self, account_id: &str) -> Option<AccountState> {
        self.projection.get(account_id)
    }

    pub fn list_projections(&self) -> Vec<AccountState> {
        self.projection.get_all()
    }

    /// Refold the whole log into the read model
    pub async fn rebuild_projections(&self) -> LedgerResult<usize> {
        Ok(self.projection.rebuild_all(self.log.as_ref()).await?)
    }

    pub async fn events(&self, account_id: &str) -> LedgerResult<Vec<Event>> {
        Ok(self.log.read_aggregate(account_id).await?)
    }

    pub async fn all_events(&self) -> LedgerResult<Vec<Event>> {
        Ok(self.log.read_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let ledger = Ledger::in_memory();

        let events = ledger
            .open_account("alice", Some(dec!(100)), Some("acc-1"))
            .await
            .unwrap();
        assert_eq!(events[0].aggregate_id, "acc-1");

        ledger.withdraw("acc-1", dec!(40)).await.unwrap();

        let state = ledger.account_state("acc-1").await.unwrap();
        assert_eq!(state.balance(), dec!(60));
        assert_eq!(ledger.projection("acc-1"), Some(state));
        assert_eq!(ledger.events("acc-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_account_state_is_zero() {
        let ledger = Ledger::in_memory();

        let state = ledger.account_state("nobody").await.unwrap();
        assert!(!state.exists());
        assert_eq!(state.version(), 0);
        assert!(ledger.projection("nobody").is_none());
    }

    #[tokio::test]
    async fn test_open_from_memory_config() {
        let config = Config {
            storage: StorageKind::Memory,
            ..Config::default()
        };
        let ledger = Ledger::open(&config).await.unwrap();
        assert_eq!(ledger.event_log().name(), "memory");

        let err = ledger.close_account("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
