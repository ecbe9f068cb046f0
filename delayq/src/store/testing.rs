//! Test suite for ensuring a correct implementation of a store.
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde_json::{json, Map, Value};

use super::*;
use crate::index::IndexProvisioner;

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn payload() -> Map<String, Value> {
    match json!({ "name": "payload", "nested": { "count": 3 } }) {
        Value::Object(fields) => fields,
        _ => unreachable!(),
    }
}

/// Create test suite for a delayq store.
///
/// For store implementors, it is useful to include this as part of your test suites.
///
/// # Example
///
/// ```
/// use delayq::store_test_suite;
/// use delayq::store::memory::InMemoryStore;
/// store_test_suite!(for: InMemoryStore::new());
/// ```
///
/// If you are using a different async test attribute you can configure the macro to use that
/// instead:
///
/// ```ignore
/// use delayq::store_test_suite;
/// store_test_suite!(
///     attr: tokio::test(flavor = "multi_thread"),
///     args: (),
///     store: StoreImplementation::connect().await.unwrap()
/// );
/// ```
#[macro_export]
macro_rules! store_test_suite {
    (for: $store:expr) => {
        $crate::store_test_suite!(attr: tokio::test, args: (), store: $store);
    };
    (attr: $attr:meta, args: $args:tt, store: $store:expr) => {
        #[$attr]
        async fn insert_one_assigns_distinct_ids $args {
            let store = $store;
            $crate::store::testing::insert_one_assigns_distinct_ids(store).await;
        }
        #[$attr]
        async fn insert_one_ignores_supplied_id $args {
            let store = $store;
            $crate::store::testing::insert_one_ignores_supplied_id(store).await;
        }
        #[$attr]
        async fn find_one_and_update_returns_updated_document $args {
            let store = $store;
            $crate::store::testing::find_one_and_update_returns_updated_document(store).await;
        }
        #[$attr]
        async fn find_one_and_update_preserves_untouched_fields $args {
            let store = $store;
            $crate::store::testing::find_one_and_update_preserves_untouched_fields(store).await;
        }
        #[$attr]
        async fn find_one_and_update_without_match $args {
            let store = $store;
            $crate::store::testing::find_one_and_update_without_match(store).await;
        }
        #[$attr]
        async fn find_one_and_update_awards_document_once $args {
            let store = $store;
            $crate::store::testing::find_one_and_update_awards_document_once(store).await;
        }
        #[$attr]
        async fn find_one_and_update_on_stale_heartbeat $args {
            let store = $store;
            $crate::store::testing::find_one_and_update_on_stale_heartbeat(store).await;
        }
        #[$attr]
        async fn filters_on_dates $args {
            let store = $store;
            $crate::store::testing::filters_on_dates(store).await;
        }
        #[$attr]
        async fn filters_on_missing_heartbeat $args {
            let store = $store;
            $crate::store::testing::filters_on_missing_heartbeat(store).await;
        }
        #[$attr]
        async fn delete_one $args {
            let store = $store;
            $crate::store::testing::delete_one(store).await;
        }
        #[$attr]
        async fn delete_one_not_found $args {
            let store = $store;
            $crate::store::testing::delete_one_not_found(store).await;
        }
        #[$attr]
        async fn count $args {
            let store = $store;
            $crate::store::testing::count(store).await;
        }
        #[$attr]
        async fn ensure_index_is_idempotent $args {
            let store = $store;
            $crate::store::testing::ensure_index_is_idempotent(store).await;
        }
    };
}

#[doc(hidden)]
pub async fn insert_one_assigns_distinct_ids(store: impl Store) {
    let id1 = store
        .insert_one(Document::pending(now(), payload()))
        .await
        .unwrap();
    let id2 = store
        .insert_one(Document::pending(now(), payload()))
        .await
        .unwrap();

    assert_ne!(id1, id2);
    assert_eq!(store.count(&Filter::IdEquals(id1)).await.unwrap(), 1);
    assert_eq!(store.count(&Filter::IdEquals(id2)).await.unwrap(), 1);
}

#[doc(hidden)]
pub async fn insert_one_ignores_supplied_id(store: impl Store) {
    let supplied: ItemId = "supplied".into();
    let id = store
        .insert_one(Document::pending(now(), payload()).with_id(supplied.clone()))
        .await
        .unwrap();

    assert_ne!(id, supplied);
    assert_eq!(store.count(&Filter::IdEquals(supplied)).await.unwrap(), 0);
    assert_eq!(store.count(&Filter::IdEquals(id)).await.unwrap(), 1);
}

#[doc(hidden)]
pub async fn find_one_and_update_returns_updated_document(store: impl Store) {
    let run_date = now() - TimeDelta::seconds(1);
    let heartbeat = now();
    let id = store
        .insert_one(Document::pending(run_date, payload()))
        .await
        .unwrap();

    let document = store
        .find_one_and_update(
            &Filter::IdEquals(id.clone()),
            &Update::default()
                .status(ItemStatus::Processing)
                .heartbeat(heartbeat),
        )
        .await
        .unwrap()
        .expect("Document should match");

    assert_eq!(document.id, Some(id));
    assert_eq!(document.item_status(), Some(ItemStatus::Processing));
    assert_eq!(document.heartbeat, Some(heartbeat));
    assert_eq!(document.run_date, Some(run_date));
}

#[doc(hidden)]
pub async fn find_one_and_update_preserves_untouched_fields(store: impl Store) {
    let id = store
        .insert_one(Document::pending(now(), payload()))
        .await
        .unwrap();

    let document = store
        .find_one_and_update(&Filter::IdEquals(id), &Update::default().heartbeat(now()))
        .await
        .unwrap()
        .expect("Document should match");

    assert_eq!(document.item_status(), Some(ItemStatus::Pending));
    assert_eq!(document.payload, payload());
}

#[doc(hidden)]
pub async fn find_one_and_update_without_match(store: impl Store) {
    store
        .insert_one(Document::pending(now(), payload()))
        .await
        .unwrap();

    let document = store
        .find_one_and_update(
            &Filter::StatusEqual(ItemStatus::Processing),
            &Update::default().status(ItemStatus::Processing),
        )
        .await
        .unwrap();

    assert!(document.is_none());
    assert_eq!(
        store
            .count(&Filter::StatusEqual(ItemStatus::Pending))
            .await
            .unwrap(),
        1
    );
}

#[doc(hidden)]
pub async fn find_one_and_update_awards_document_once(store: impl Store) {
    store
        .insert_one(Document::pending(now(), payload()))
        .await
        .unwrap();
    let filter = Filter::StatusEqual(ItemStatus::Pending);
    let update = Update::default()
        .status(ItemStatus::Processing)
        .heartbeat(now());

    let claimed = futures::future::join_all(
        (0..8).map(|_| store.find_one_and_update(&filter, &update)),
    )
    .await
    .into_iter()
    .map(Result::unwrap)
    .filter(Option::is_some)
    .count();

    assert_eq!(claimed, 1);
}

#[doc(hidden)]
pub async fn find_one_and_update_on_stale_heartbeat(store: impl Store) {
    let first = now();
    let second = first + TimeDelta::seconds(1);
    let id = store
        .insert_one(Document::pending(first, payload()))
        .await
        .unwrap();
    store
        .find_one_and_update(
            &Filter::IdEquals(id.clone()),
            &Update::default().heartbeat(first),
        )
        .await
        .unwrap()
        .expect("Document should match");
    store
        .find_one_and_update(
            &Filter::IdEquals(id.clone()),
            &Update::default().heartbeat(second),
        )
        .await
        .unwrap()
        .expect("Document should match");

    let guarded = |heartbeat| {
        Filter::And(vec![
            Filter::IdEquals(id.clone()),
            Filter::HeartbeatEqual(heartbeat),
        ])
    };

    assert!(store
        .find_one_and_update(&guarded(first), &Update::default().heartbeat(now()))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_one_and_update(&guarded(second), &Update::default().heartbeat(now()))
        .await
        .unwrap()
        .is_some());
}

#[doc(hidden)]
pub async fn filters_on_dates(store: impl Store) {
    let now = now();
    store
        .insert_one(Document::pending(now - TimeDelta::minutes(1), payload()))
        .await
        .unwrap();
    store
        .insert_one(Document::pending(now, payload()))
        .await
        .unwrap();
    store
        .insert_one(Document::pending(now + TimeDelta::minutes(1), payload()))
        .await
        .unwrap();

    assert_eq!(store.count(&Filter::RunDateBefore(now)).await.unwrap(), 1);
    assert_eq!(store.count(&Filter::RunDateAtOrBefore(now)).await.unwrap(), 2);
    assert_eq!(
        store
            .count(&Filter::RunDateAtOrBefore(now + TimeDelta::hours(1)))
            .await
            .unwrap(),
        3
    );
}

#[doc(hidden)]
pub async fn filters_on_missing_heartbeat(store: impl Store) {
    let now = now();
    let id = store
        .insert_one(Document::pending(now, payload()))
        .await
        .unwrap();
    store
        .insert_one(Document::pending(now, payload()))
        .await
        .unwrap();
    store
        .find_one_and_update(&Filter::IdEquals(id), &Update::default().heartbeat(now))
        .await
        .unwrap()
        .expect("Document should match");

    assert_eq!(store.count(&Filter::HeartbeatMissing).await.unwrap(), 1);
    assert_eq!(store.count(&Filter::HeartbeatAtOrBefore(now)).await.unwrap(), 1);
    assert_eq!(
        store
            .count(&Filter::Or(vec![
                Filter::HeartbeatMissing,
                Filter::HeartbeatEqual(now),
            ]))
            .await
            .unwrap(),
        2
    );
}

#[doc(hidden)]
pub async fn delete_one(store: impl Store) {
    let id = store
        .insert_one(Document::pending(now(), payload()))
        .await
        .unwrap();

    assert_eq!(store.delete_one(&id).await.unwrap(), 1);
    assert_eq!(store.count(&Filter::IdEquals(id.clone())).await.unwrap(), 0);
    assert_eq!(store.delete_one(&id).await.unwrap(), 0);
}

#[doc(hidden)]
pub async fn delete_one_not_found(store: impl Store) {
    store
        .insert_one(Document::pending(now(), payload()))
        .await
        .unwrap();

    assert_eq!(store.delete_one(&"missing".into()).await.unwrap(), 0);
    assert_eq!(
        store
            .count(&Filter::StatusEqual(ItemStatus::Pending))
            .await
            .unwrap(),
        1
    );
}

#[doc(hidden)]
pub async fn count(store: impl Store) {
    let pending = Filter::StatusEqual(ItemStatus::Pending);
    assert_eq!(store.count(&pending).await.unwrap(), 0);

    for _ in 0..3 {
        store
            .insert_one(Document::pending(now(), payload()))
            .await
            .unwrap();
    }
    store
        .find_one_and_update(&pending, &Update::default().status(ItemStatus::Processing))
        .await
        .unwrap()
        .expect("Document should match");

    assert_eq!(store.count(&pending).await.unwrap(), 2);
    assert_eq!(
        store
            .count(&Filter::StatusEqual(ItemStatus::Processing))
            .await
            .unwrap(),
        1
    );
}

#[doc(hidden)]
pub async fn ensure_index_is_idempotent(store: impl Store) {
    for index in IndexProvisioner::required_indexes() {
        assert!(store.ensure_index(&index).await.is_ok());
        assert!(store.ensure_index(&index).await.is_ok());
    }
}
