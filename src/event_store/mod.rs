//! Event Store module
//!
//! Persistence layer for Event Sourcing.
//! Defines the [`EventLog`] contract and its backends.

mod backend;
mod error;
mod file;
mod log;
mod memory;
mod postgres;

pub use backend::EventLogBackend;
pub use error::EventStoreError;
pub use file::FileEventLog;
pub use log::EventLog;
pub use memory::InMemoryEventLog;
pub use postgres::PostgresEventLog;
