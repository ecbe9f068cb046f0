//! A [`delayq::store::Store`] backed by a MongoDB collection.
//!
//! Items are stored as flat documents with the lease fields next to the payload fields:
//!
//! ```text
//! { _id: ObjectId, status: "PENDING" | "PROCESSING", runDate: Date, heartbeat: Date | null, ... }
//! ```
//!
//! Claims and heartbeats go through `findOneAndUpdate` with `$set`, which the server applies
//! atomically per document.
//!
//! # Example
//!
//! ```no_run
//! # use delayq::prelude::*;
//! # use delayq_mongodb::MongoStore;
//! # async fn run() -> Result<(), SchedulerError> {
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Email {
//!     to: String,
//! }
//!
//! let config = SchedulerConfig::new().with_collection("emails");
//! let store = MongoStore::connect("mongodb://localhost:27017", &config).await?;
//! let scheduler = Scheduler::from_config(store, JsonCodec::<Email>::new(), &config);
//! scheduler.setup().await?;
//! # Ok(())
//! # }
//! ```
use async_trait::async_trait;
use delayq::{
    config::SchedulerConfig,
    document::Document,
    item::ItemId,
    store::{Filter, Index, Store, StoreError, Update},
};
use mongodb::{
    bson::Document as BsonDocument,
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Client, Collection,
};
use tracing::instrument;

mod convert;

use convert::ToFilter;

#[derive(Clone, Debug)]
pub struct MongoStore {
    collection: Collection<BsonDocument>,
}

impl std::ops::Deref for MongoStore {
    type Target = Collection<BsonDocument>;

    fn deref(&self) -> &Self::Target {
        &self.collection
    }
}

impl From<Collection<BsonDocument>> for MongoStore {
    fn from(collection: Collection<BsonDocument>) -> Self {
        Self { collection }
    }
}

impl MongoStore {
    pub fn new(client: &Client, database: &str, collection: &str) -> Self {
        client
            .database(database)
            .collection::<BsonDocument>(collection)
            .into()
    }

    /// Connect to the deployment at `uri` and bind to the configured database and collection.
    pub async fn connect(uri: &str, config: &SchedulerConfig) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await.map_err(map_err)?;
        Ok(Self::new(&client, &config.database, &config.collection))
    }
}

fn map_err(error: mongodb::error::Error) -> StoreError {
    tracing::error!(%error, "MongoDB operation failed");
    StoreError::Unavailable(Box::new(error))
}

#[async_trait]
impl Store for MongoStore {
    #[instrument(skip(self))]
    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>, StoreError> {
        let filter = filter.to_filter();
        let document = match convert::to_modifications(update) {
            Some(modifications) => {
                let options = FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build();
                self.collection
                    .find_one_and_update(filter, modifications, options)
                    .await
            }
            None => self.collection.find_one(filter, None).await,
        }
        .map_err(map_err)?;

        Ok(document.map(convert::from_bson_document))
    }

    #[instrument(skip(self, document))]
    async fn insert_one(&self, document: Document) -> Result<ItemId, StoreError> {
        let document = convert::to_bson_document(document)?;
        let result = self
            .collection
            .insert_one(document, None)
            .await
            .map_err(map_err)?;
        let id = convert::bson_to_id(result.inserted_id);
        tracing::debug!(%id, "Inserted document {id}");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn delete_one(&self, id: &ItemId) -> Result<u64, StoreError> {
        let result = self
            .collection
            .delete_one(Filter::IdEquals(id.clone()).to_filter(), None)
            .await
            .map_err(map_err)?;
        Ok(result.deleted_count)
    }

    #[instrument(skip(self))]
    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.collection
            .count_documents(filter.to_filter(), None)
            .await
            .map_err(map_err)
    }

    #[instrument(skip(self))]
    async fn ensure_index(&self, index: &Index) -> Result<(), StoreError> {
        self.collection
            .create_index(convert::to_index_model(index), None)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    //! These tests need a running MongoDB. They are skipped unless `DELAYQ_MONGODB_URL` is set.
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use chrono::{TimeDelta, Utc};
    use delayq::{prelude::*, store_test_suite};

    use super::*;

    const URL_VAR: &str = "DELAYQ_MONGODB_URL";
    static COLLECTIONS: AtomicUsize = AtomicUsize::new(0);

    /// A store over a fresh collection, or `None` when no database is configured.
    async fn store() -> Option<MongoStore> {
        let url = std::env::var(URL_VAR).ok()?;
        let collection = format!(
            "items_{}_{}",
            Utc::now().timestamp_millis(),
            COLLECTIONS.fetch_add(1, Ordering::SeqCst)
        );
        let config = SchedulerConfig::new()
            .with_database("delayq_test")
            .with_collection(collection);
        Some(MongoStore::connect(&url, &config).await.unwrap())
    }

    store_test_suite!(
        attr: tokio::test(flavor = "multi_thread"),
        args: (),
        store: match store().await {
            Some(store) => store,
            None => return,
        }
    );

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Email {
        to: String,
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lease_lifecycle() {
        let Some(store) = store().await else {
            return;
        };
        let clock = ManualClock::default();
        let scheduler = Scheduler::new(store, JsonCodec::<Email>::new(), TimeDelta::seconds(30))
            .with_clock(clock.clone());
        scheduler.setup().await.unwrap();

        let email = Email {
            to: "someone@example.com".to_owned(),
        };
        let id = scheduler
            .schedule(EnqueuableItem::new(clock.now(), email.clone()))
            .await
            .unwrap();

        let claimed = scheduler.peek().await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, ItemStatus::Processing);
        assert_eq!(claimed.payload, email);
        assert!(scheduler.peek().await.unwrap().is_none());

        clock.advance(TimeDelta::seconds(10));
        let renewed = scheduler.heartbeat(&claimed).await.unwrap();
        assert_eq!(renewed.heartbeat, Some(clock.now()));
        assert_matches!(
            scheduler.heartbeat(&claimed).await,
            Err(SchedulerError::LeaseLost(lost)) if lost == id
        );

        clock.advance(TimeDelta::seconds(31));
        let reclaimed = scheduler.peek().await.unwrap().unwrap();
        assert_eq!(reclaimed.id, id);
        assert_matches!(
            scheduler.heartbeat(&renewed).await,
            Err(SchedulerError::LeaseLost(_))
        );

        assert_eq!(scheduler.delete(&reclaimed).await.unwrap(), 1);
        assert_eq!(
            scheduler.count_by_status(ItemStatus::Processing).await.unwrap(),
            0
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn future_items_are_only_counted() {
        let Some(store) = store().await else {
            return;
        };
        let clock = ManualClock::default();
        let scheduler = Scheduler::new(store, JsonCodec::<Email>::new(), TimeDelta::seconds(30))
            .with_clock(clock.clone());

        for offset in [-60, -30, 60] {
            scheduler
                .schedule(EnqueuableItem::new(
                    clock.now() + TimeDelta::seconds(offset),
                    Email {
                        to: format!("{offset}@example.com"),
                    },
                ))
                .await
                .unwrap();
        }

        assert_eq!(scheduler.count_delayed().await.unwrap(), 2);
        assert_eq!(
            scheduler.count_by_status(ItemStatus::Pending).await.unwrap(),
            3
        );
        assert!(scheduler.poll().await.unwrap().is_some());
        assert!(scheduler.poll().await.unwrap().is_some());
        assert!(scheduler.poll().await.unwrap().is_none());
    }
}
