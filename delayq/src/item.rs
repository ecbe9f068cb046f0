//! The unit of work handed out by the [`crate::Scheduler`].
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::CodecError;

/// Opaque identifier assigned by the store when an item is inserted.
#[derive(Debug, Eq, PartialEq, Clone, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The live states of an item.
///
/// There is no terminal state: an item that has been processed is deleted.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ItemStatus {
    /// Waiting for its run date, or ready to be claimed.
    Pending,
    /// Leased by a worker. The lease is only valid while the heartbeat is fresh.
    Processing,
}

impl ItemStatus {
    /// The representation persisted in the store.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
        }
    }
}

impl Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            other => Err(CodecError::InvalidStatus(other.to_owned())),
        }
    }
}

/// A snapshot of a scheduled item as last read from the store.
///
/// The snapshot is evidence of a lease: [`crate::Scheduler::heartbeat`] only succeeds while the
/// stored heartbeat still equals [`Item::heartbeat`].
#[derive(Debug, Clone, PartialEq)]
pub struct Item<P> {
    pub id: ItemId,
    pub status: ItemStatus,
    /// The earliest instant at which the item can be claimed.
    pub run_date: DateTime<Utc>,
    /// The instant of the last claim or lease renewal.
    pub heartbeat: Option<DateTime<Utc>>,
    pub payload: P,
}

/// The input to [`crate::Scheduler::schedule`].
///
/// Only the run date and payload are kept. Identifier, status and heartbeat are always assigned
/// by the scheduler and the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueuableItem<P> {
    pub run_date: DateTime<Utc>,
    pub payload: P,
}

impl<P> EnqueuableItem<P> {
    pub fn new(run_date: DateTime<Utc>, payload: P) -> Self {
        Self { run_date, payload }
    }
}

impl<P> From<Item<P>> for EnqueuableItem<P> {
    fn from(value: Item<P>) -> Self {
        Self {
            run_date: value.run_date,
            payload: value.payload,
        }
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn id_displays_as_the_bare_id() {
        let id = ItemId::from("65f1c0ffee0000000000000a");

        assert_eq!(id.to_string(), "65f1c0ffee0000000000000a");
        assert_eq!(
            crate::SchedulerError::LeaseLost(id).to_string(),
            "Lease on 65f1c0ffee0000000000000a is no longer held"
        );
    }

    #[test]
    fn status_round_trips_through_its_stored_name() {
        assert_eq!(ItemStatus::Pending.as_str(), "PENDING");
        assert_eq!(ItemStatus::Processing.as_str(), "PROCESSING");
        assert_eq!("PENDING".parse::<ItemStatus>().unwrap(), ItemStatus::Pending);
        assert_eq!(
            "PROCESSING".parse::<ItemStatus>().unwrap(),
            ItemStatus::Processing
        );
    }

    #[test]
    fn status_rejects_unknown_names() {
        assert_matches!(
            "pending".parse::<ItemStatus>(),
            Err(CodecError::InvalidStatus(status)) if status == "pending"
        );
        assert_matches!("DONE".parse::<ItemStatus>(), Err(CodecError::InvalidStatus(_)));
    }

    #[test]
    fn enqueuable_item_drops_lease_state() {
        let run_date = Utc::now();
        let item = Item {
            id: "42".into(),
            status: ItemStatus::Processing,
            run_date,
            heartbeat: Some(run_date),
            payload: "payload",
        };

        assert_eq!(
            EnqueuableItem::from(item),
            EnqueuableItem::new(run_date, "payload")
        );
    }
}
