//! The shape in which items are persisted.
//!
//! A [`Document`] is deliberately loose: every control field is optional so that whatever the
//! store hands back can be represented, and it is the job of [`crate::codec::Codec::decode`] to
//! reject malformed documents.
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::item::{ItemId, ItemStatus};

/// Field names of the persisted document.
pub mod fields {
    pub const ID: &str = "_id";
    pub const STATUS: &str = "status";
    pub const RUN_DATE: &str = "runDate";
    pub const HEARTBEAT: &str = "heartbeat";

    /// Fields owned by the scheduler. User payload may not use these names.
    pub const RESERVED: [&str; 4] = [ID, STATUS, RUN_DATE, HEARTBEAT];

    pub fn is_reserved(field: &str) -> bool {
        RESERVED.contains(&field)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// Absent until the store has inserted the document.
    pub id: Option<ItemId>,
    pub status: Option<String>,
    pub run_date: Option<DateTime<Utc>>,
    pub heartbeat: Option<DateTime<Utc>>,
    /// User fields stored alongside the control fields.
    pub payload: Map<String, Value>,
}

impl Document {
    /// A freshly scheduled document: pending, never claimed.
    pub fn pending(run_date: DateTime<Utc>, payload: Map<String, Value>) -> Self {
        Self {
            id: None,
            status: Some(ItemStatus::Pending.as_str().to_owned()),
            run_date: Some(run_date),
            heartbeat: None,
            payload,
        }
    }

    pub fn with_id(self, id: ItemId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    /// The parsed status, if present and valid.
    pub fn item_status(&self) -> Option<ItemStatus> {
        self.status.as_deref().and_then(|status| status.parse().ok())
    }
}
