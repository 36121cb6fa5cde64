//! Domain Events
//!
//! Event definitions for Event Sourcing.
//! Events are immutable facts that have happened to an account.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::amount::{Amount, AmountError};

pub const ACCOUNT_OPENED: &str = "AccountOpened";
pub const MONEY_DEPOSITED: &str = "MoneyDeposited";
pub const MONEY_WITHDRAWN: &str = "MoneyWithdrawn";
pub const ACCOUNT_CLOSED: &str = "AccountClosed";

/// Account-related event payloads
#[derive(Debug, Clone, PartialEq)]
pub enum AccountEvent {
    /// Account was opened with an optional starting balance
    AccountOpened {
        owner: String,
        initial_balance: Decimal,
    },

    /// Money was deposited (balance increased)
    MoneyDeposited { amount: Decimal },

    /// Money was withdrawn (balance decreased)
    MoneyWithdrawn { amount: Decimal },

    /// Account was closed; terminal
    AccountClosed,

    /// A type tag this build doesn't know. Kept verbatim so replay
    /// still advances the version.
    Unrecognized {
        event_type: String,
        data: serde_json::Value,
    },
}

impl AccountEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &str {
        match self {
            AccountEvent::AccountOpened { .. } => ACCOUNT_OPENED,
            AccountEvent::MoneyDeposited { .. } => MONEY_DEPOSITED,
            AccountEvent::MoneyWithdrawn { .. } => MONEY_WITHDRAWN,
            AccountEvent::AccountClosed => ACCOUNT_CLOSED,
            AccountEvent::Unrecognized { event_type, .. } => event_type,
        }
    }

    /// Type-specific payload as JSON
    pub fn data(&self) -> serde_json::Value {
        match self {
            AccountEvent::AccountOpened {
                owner,
                initial_balance,
            } => json!({ "owner": owner, "initialBalance": initial_balance }),
            AccountEvent::MoneyDeposited { amount } | AccountEvent::MoneyWithdrawn { amount } => {
                json!({ "amount": amount })
            }
            AccountEvent::AccountClosed => json!({}),
            AccountEvent::Unrecognized { data, .. } => data.clone(),
        }
    }

    /// Decode a payload from its type tag and raw data
    pub fn from_parts(
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let event = match event_type {
            ACCOUNT_OPENED => {
                let data: OpenedData = serde_json::from_value(data)?;
                AccountEvent::AccountOpened {
                    owner: data.owner.unwrap_or_default(),
                    initial_balance: data.initial_balance.unwrap_or(Decimal::ZERO),
                }
            }
            MONEY_DEPOSITED => {
                let data: AmountData = serde_json::from_value(data)?;
                AccountEvent::MoneyDeposited {
                    amount: data.amount,
                }
            }
            MONEY_WITHDRAWN => {
                let data: AmountData = serde_json::from_value(data)?;
                AccountEvent::MoneyWithdrawn {
                    amount: data.amount,
                }
            }
            ACCOUNT_CLOSED => AccountEvent::AccountClosed,
            other => AccountEvent::Unrecognized {
                event_type: other.to_string(),
                data,
            },
        };
        if let Err(e) = event.check_amounts() {
            return Err(serde::de::Error::custom(format!("{event_type}: {e}")));
        }
        Ok(event)
    }

    /// Every amount carried by the payload must be a valid [`Amount`].
    pub fn check_amounts(&self) -> Result<(), AmountError> {
        match self {
            AccountEvent::AccountOpened {
                initial_balance, ..
            } => Amount::new(*initial_balance).map(drop),
            AccountEvent::MoneyDeposited { amount } | AccountEvent::MoneyWithdrawn { amount } => {
                Amount::new(*amount).map(drop)
            }
            AccountEvent::AccountClosed | AccountEvent::Unrecognized { .. } => Ok(()),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, AccountEvent::Unrecognized { .. })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenedData {
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    initial_balance: Option<Decimal>,
}

#[derive(Deserialize)]
struct AmountData {
    amount: Decimal,
}

/// A versioned event belonging to one aggregate.
///
/// Serialized through [`EventRecord`], the flat wire shape
/// `{id, aggregateId, type, data, timestamp, version}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord", into = "EventRecord")]
pub struct Event {
    pub id: Uuid,
    pub aggregate_id: String,
    pub payload: AccountEvent,
    pub timestamp: DateTime<Utc>,
    pub version: i64,
}

impl Event {
    /// Create a new event with a fresh id and the current time
    pub fn new(aggregate_id: impl Into<String>, version: i64, payload: AccountEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: aggregate_id.into(),
            payload,
            timestamp: Utc::now(),
            version,
        }
    }

    pub fn event_type(&self) -> &str {
        self.payload.event_type()
    }
}

/// Storage/wire representation of an [`Event`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Uuid,
    pub aggregate_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub version: i64,
}

impl TryFrom<EventRecord> for Event {
    type Error = serde_json::Error;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        if record.version < 1 {
            return Err(serde::de::Error::custom(format!(
                "event {} has non-positive version {}",
                record.id, record.version
            )));
        }

        let payload = AccountEvent::from_parts(&record.event_type, record.data)?;
        Ok(Self {
            id: record.id,
            aggregate_id: record.aggregate_id,
            payload,
            timestamp: record.timestamp,
            version: record.version,
        })
    }
}

impl From<Event> for EventRecord {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            event_type: event.payload.event_type().to_string(),
            data: event.payload.data(),
            aggregate_id: event.aggregate_id,
            timestamp: event.timestamp,
            version: event.version,
        }
    }
}
