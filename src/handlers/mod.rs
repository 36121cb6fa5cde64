//! Command Handlers module
//!
//! CQRS Command handlers that orchestrate business operations.
//! Each handler coordinates aggregates, event log, projections and snapshots.

mod account_handler;
mod commands;
mod retry;


pub use account_handler::AccountHandler;
pub use commands::*;
pub use retry::retry_on_conflict;
