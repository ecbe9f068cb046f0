//! Secondary indexes required for claim throughput.
use tracing::instrument;

use crate::{
    document::fields,
    store::{Index, IndexOrder, Store},
    SchedulerError,
};

/// Name of the compound index backing the claim predicate.
pub const CLAIM_INDEX: &str = "status_runDate_heartbeat";

pub struct IndexProvisioner;

impl IndexProvisioner {
    pub fn required_indexes() -> Vec<Index> {
        vec![Index {
            name: CLAIM_INDEX,
            keys: vec![
                (fields::STATUS, IndexOrder::Ascending),
                (fields::RUN_DATE, IndexOrder::Ascending),
                (fields::HEARTBEAT, IndexOrder::Ascending),
            ],
        }]
    }

    /// Create every required index, stopping at the first failure.
    #[instrument(skip(store))]
    pub async fn ensure_indexes<S>(store: &S) -> Result<(), SchedulerError>
    where
        S: Store + ?Sized,
    {
        for index in Self::required_indexes() {
            store.ensure_index(&index).await.map_err(|err| {
                tracing::error!(?err, index = index.name, "Failed to create index {}", index.name);
                SchedulerError::SetupFailed(err)
            })?;
            tracing::debug!(index = index.name, "Ensured index {}", index.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;
    use crate::store::{memory::InMemoryStore, MockStore, StoreError};

    #[tokio::test]
    async fn ensure_indexes_is_idempotent() {
        let store = InMemoryStore::new();

        IndexProvisioner::ensure_indexes(&store).await.unwrap();
        let once = store.indexes().unwrap();
        IndexProvisioner::ensure_indexes(&store).await.unwrap();
        IndexProvisioner::ensure_indexes(&store).await.unwrap();

        assert_eq!(store.indexes().unwrap(), once);
        assert_eq!(once, IndexProvisioner::required_indexes());
    }

    #[test]
    fn claim_index_covers_the_claim_predicate_fields() {
        let indexes = IndexProvisioner::required_indexes();
        let fields: Vec<_> = indexes[0].keys.iter().map(|(field, _)| *field).collect();

        assert_eq!(fields, ["status", "runDate", "heartbeat"]);
    }

    #[tokio::test]
    async fn ensure_indexes_surfaces_failure() {
        let mut store = MockStore::new();
        store
            .expect_ensure_index()
            .times(1)
            .returning(|_| Err(StoreError::BadState));

        assert_matches!(
            IndexProvisioner::ensure_indexes(&store).await,
            Err(SchedulerError::SetupFailed(StoreError::BadState))
        );
    }
}
