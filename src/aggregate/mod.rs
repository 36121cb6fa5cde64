//! Aggregate module
//!
//! Aggregate Root pattern implementation for Event Sourcing.

pub mod account;

pub use account::{reconstruct, AccountState};

use crate::domain::Event;

/// Aggregate trait that all aggregates must implement
pub trait Aggregate: Sized {
    /// Get the aggregate type name (for storage)
    fn aggregate_type() -> &'static str;

    /// Get the aggregate ID
    fn id(&self) -> &str;

    /// Get the current version (version of the last applied event)
    fn version(&self) -> i64;

    /// Fold one event into the state
    fn apply(&mut self, event: &Event);

    /// Check if a snapshot should be created; `interval == 0` disables snapshots
    fn should_snapshot(&self, interval: i64) -> bool {
        interval > 0 && self.version() > 0 && self.version() % interval == 0
    }
}
