//! Projection module
//!
//! Read model of current account state, derived from events and optimized
//! for queries. Never authoritative: it can always be rebuilt from the log.

mod service;

pub use service::{ApplyOutcome, ProjectionService};
