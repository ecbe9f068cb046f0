//! The lease and heartbeat state machine.
//!
//! ```text
//! (nonexistent) --schedule------> PENDING
//! PENDING       --peek----------> PROCESSING   (heartbeat = now)
//! PROCESSING    --heartbeat-----> PROCESSING   (heartbeat = now, only if the prior heartbeat matches)
//! PROCESSING    --delete--------> (nonexistent)
//! PROCESSING    --lease expiry--> claimable again by the next peek
//! ```
use std::sync::Arc;

use chrono::{SubsecRound, TimeDelta};
use tracing::instrument;

use crate::{
    clock::{Clock, SystemClock},
    codec::Codec,
    config::SchedulerConfig,
    document::Document,
    index::IndexProvisioner,
    item::{EnqueuableItem, Item, ItemId, ItemStatus},
    query::QueryBuilder,
    store::Store,
    SchedulerError,
};

type Result<T> = std::result::Result<T, SchedulerError>;

/// Hands out scheduled items to competing workers.
///
/// Cloning is cheap and clones share the same store, so a single scheduler can be handed to any
/// number of worker tasks. The scheduler itself holds no locks and caches nothing: every
/// operation is a fresh round trip to the store.
pub struct Scheduler<S, C, K = SystemClock> {
    store: Arc<S>,
    codec: Arc<C>,
    clock: Arc<K>,
    queries: QueryBuilder,
}

impl<S, C, K> Clone for Scheduler<S, C, K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            codec: self.codec.clone(),
            clock: self.clock.clone(),
            queries: self.queries,
        }
    }
}

impl<S, C, K> std::fmt::Debug for Scheduler<S, C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("heartbeat_expiration", &self.queries.heartbeat_expiration())
            .finish_non_exhaustive()
    }
}

impl<S, C> Scheduler<S, C>
where
    S: Store,
    C: Codec,
{
    /// Items whose heartbeat is older than `heartbeat_expiration` are considered abandoned.
    pub fn new(store: S, codec: C, heartbeat_expiration: TimeDelta) -> Self {
        Self {
            store: Arc::new(store),
            codec: Arc::new(codec),
            clock: Arc::new(SystemClock),
            queries: QueryBuilder::new(heartbeat_expiration),
        }
    }

    pub fn from_config(store: S, codec: C, config: &SchedulerConfig) -> Self {
        Self::new(store, codec, config.heartbeat_expiration())
    }
}

impl<S, C, K> Scheduler<S, C, K>
where
    S: Store,
    C: Codec,
    K: Clock,
{
    pub fn with_clock<T: Clock>(self, clock: T) -> Scheduler<S, C, T> {
        Scheduler {
            store: self.store,
            codec: self.codec,
            clock: Arc::new(clock),
            queries: self.queries,
        }
    }

    pub fn heartbeat_expiration(&self) -> TimeDelta {
        self.queries.heartbeat_expiration()
    }

    /// Create the indexes the claim query relies on.
    ///
    /// This should be called before first use. Calling it again is harmless.
    pub async fn setup(&self) -> Result<()> {
        IndexProvisioner::ensure_indexes(self.store.as_ref()).await
    }

    /// Insert a new `PENDING` item which becomes claimable once its run date has passed.
    ///
    /// Anything other than the run date and payload of the given item is ignored, so scheduling
    /// an [`Item`] previously returned by [`Scheduler::peek`] enqueues a fresh copy of it.
    #[instrument(skip(self, item))]
    pub async fn schedule(&self, item: impl Into<EnqueuableItem<C::Payload>>) -> Result<ItemId> {
        let item = item.into();
        let payload = self
            .codec
            .encode(&item.payload)
            .map_err(SchedulerError::Encode)?;
        let run_date = item.run_date.trunc_subsecs(3);
        let item_id = self
            .store
            .insert_one(Document::pending(run_date, payload))
            .await?;
        tracing::debug!(%item_id, %run_date, "Scheduled item {item_id}");
        Ok(item_id)
    }

    /// Claim any single item which is due and either pending or abandoned.
    ///
    /// The claimed item is returned in `PROCESSING` with a fresh heartbeat. Returns `None` when
    /// there is nothing to claim.
    #[instrument(skip(self))]
    pub async fn peek(&self) -> Result<Option<Item<C::Payload>>> {
        let now = self.clock.now();
        let document = self
            .store
            .find_one_and_update(&self.queries.claim(now), &self.queries.claim_update(now))
            .await?;
        match document {
            Some(document) => {
                let item = self.decode(document)?;
                tracing::debug!(item_id = %item.id, "Claimed item {}", item.id);
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Claim an item and delete it straight away.
    ///
    /// The item is only returned if this call was the one to delete it. If something else
    /// removed it between the claim and the delete, `None` is returned.
    #[instrument(skip(self))]
    pub async fn poll(&self) -> Result<Option<Item<C::Payload>>> {
        let Some(item) = self.peek().await? else {
            return Ok(None);
        };
        match self.delete(&item).await? {
            0 => {
                tracing::warn!(
                    item_id = %item.id,
                    "Item {} was removed before it could be polled",
                    item.id
                );
                Ok(None)
            }
            _ => Ok(Some(item)),
        }
    }

    /// Extend the lease on an item.
    ///
    /// Succeeds only if the stored heartbeat still equals the one on `item`, and returns the
    /// item with its new heartbeat, which must be used for the next renewal. Otherwise the lease
    /// has been lost to another worker (or the item is gone) and
    /// [`SchedulerError::LeaseLost`] is returned.
    ///
    /// The new heartbeat is always later than the old one, even within the same millisecond.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn heartbeat(&self, item: &Item<C::Payload>) -> Result<Item<C::Payload>> {
        let (Some(filter), Some(prior)) = (self.queries.heartbeat_renewal(item), item.heartbeat)
        else {
            tracing::warn!("Item {} has never been claimed", item.id);
            return Err(SchedulerError::LeaseLost(item.id.clone()));
        };
        let now = self.clock.now();
        match self
            .store
            .find_one_and_update(&filter, &self.queries.renewal_update(prior, now))
            .await?
        {
            Some(document) => {
                let item = self.decode(document)?;
                tracing::debug!("Renewed lease on item {}", item.id);
                Ok(item)
            }
            None => {
                tracing::warn!("Lease on item {} was lost", item.id);
                Err(SchedulerError::LeaseLost(item.id.clone()))
            }
        }
    }

    /// Remove an item, returning the number of items deleted.
    ///
    /// The delete is unconditional. It should only be issued while holding the lease; a result
    /// of `0` means the item was already gone.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn delete(&self, item: &Item<C::Payload>) -> Result<u64> {
        let deleted = self.store.delete_one(&item.id).await?;
        tracing::debug!(deleted, "Deleted item {}", item.id);
        Ok(deleted)
    }

    /// Reserved.
    ///
    /// Whether this should return an item to `PENDING` with its original run date, push the run
    /// date forward, or re-enqueue after a failure is undecided, so it always returns
    /// [`SchedulerError::NotImplemented`].
    pub async fn reschedule(&self, _item: &Item<C::Payload>) -> Result<Item<C::Payload>> {
        Err(SchedulerError::NotImplemented("reschedule"))
    }

    #[instrument(skip(self))]
    pub async fn count_by_status(&self, status: ItemStatus) -> Result<u64> {
        Ok(self.store.count(&self.queries.status(status)).await?)
    }

    /// The number of items whose run date has passed.
    #[instrument(skip(self))]
    pub async fn count_delayed(&self) -> Result<u64> {
        let now = self.clock.now();
        Ok(self.store.count(&self.queries.delayed(now)).await?)
    }

    fn decode(&self, document: Document) -> Result<Item<C::Payload>> {
        let id = document.id.clone();
        self.codec.decode(document).map_err(|err| {
            tracing::error!(?err, ?id, "Failed to decode item: {err}");
            SchedulerError::Decode(err)
        })
    }
}
