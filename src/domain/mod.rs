//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod error;
pub mod events;

pub use amount::{Amount, AmountError};
pub use error::DomainError;
pub use events::{AccountEvent, Event, EventRecord};
