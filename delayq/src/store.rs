//! The capability the [`crate::Scheduler`] needs from a document store.
//!
//! A [`Store`] is bound to a single collection. It must provide an atomic find-and-update: the
//! match against a [`Filter`] and the application of an [`Update`] happen as a single operation,
//! so that two concurrent callers can never both update the same document through the same
//! filter. Everything the scheduler guarantees about mutual exclusion rests on that.
//!
//! An in-memory implementation is provided in [`memory`], and [`testing`] contains a suite of
//! checks that any implementation should pass.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    document::Document,
    item::{ItemId, ItemStatus},
};

pub mod memory;
pub(crate) mod matches;
pub mod testing;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically find one document matching `filter`, apply `update` to it and return the
    /// document as it is after the update.
    ///
    /// When several documents match, any one of them may be chosen. Fields not named in the
    /// update are left untouched.
    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>, StoreError>;

    /// Insert a new document, returning the identifier assigned to it.
    ///
    /// Any id already set on `document` is ignored.
    async fn insert_one(&self, document: Document) -> Result<ItemId, StoreError>;

    /// Delete the document with the given id, returning the number of documents deleted.
    async fn delete_one(&self, id: &ItemId) -> Result<u64, StoreError>;

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Create the index if it does not already exist.
    async fn ensure_index(&self, index: &Index) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("System in bad state")]
    BadState,
    #[error("Store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

/// A predicate over stored documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    IdEquals(ItemId),
    StatusEqual(ItemStatus),
    RunDateAtOrBefore(DateTime<Utc>),
    RunDateBefore(DateTime<Utc>),
    HeartbeatAtOrBefore(DateTime<Utc>),
    HeartbeatEqual(DateTime<Utc>),
    /// The heartbeat is absent or null.
    HeartbeatMissing,
}

/// The fields to set on a matched document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Update {
    pub status: Option<ItemStatus>,
    pub heartbeat: Option<DateTime<Utc>>,
}

impl Update {
    pub fn status(self, status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            ..self
        }
    }

    pub fn heartbeat(self, heartbeat: DateTime<Utc>) -> Self {
        Self {
            heartbeat: Some(heartbeat),
            ..self
        }
    }

    pub(crate) fn apply(&self, document: &mut Document) {
        if let Some(status) = self.status {
            document.status = Some(status.as_str().to_owned());
        }
        if let Some(heartbeat) = self.heartbeat {
            document.heartbeat = Some(heartbeat);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexOrder {
    Ascending,
    Descending,
}

/// A secondary index over one or more document fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Index {
    pub name: &'static str,
    pub keys: Vec<(&'static str, IndexOrder)>,
}
