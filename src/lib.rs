//! ledger Library
//!
//! Event-sourced account ledger. Re-exports modules for the binaries,
//! integration testing and external use.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod event_store;
pub mod handlers;
pub mod ledger;
pub mod projection;
pub mod snapshot;

pub use aggregate::{reconstruct, AccountState, Aggregate};
pub use config::{Config, ConfigError, StorageKind};
pub use domain::{AccountEvent, Amount, AmountError, DomainError, Event, EventRecord};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use event_store::{EventLog, EventLogBackend, EventStoreError};
pub use handlers::retry_on_conflict;
pub use ledger::{ConfiguredLedger, Ledger, StartupError};
pub use projection::{ApplyOutcome, ProjectionService};
pub use snapshot::{Snapshot, SnapshotBackend, SnapshotStore};
