//! The predicates and updates behind the scheduler operations.
//!
//! # Claim predicate
//!
//! An item can be claimed when it is due and either pending or holding an expired lease:
//!
//! ```text
//! runDate <= now
//! AND (
//!       status = PENDING
//!    OR (status = PROCESSING AND heartbeat <= now - H)
//!    OR (status = PROCESSING AND heartbeat IS NULL)
//! )
//! ```
//!
//! # Renewal predicate
//!
//! A lease can be renewed only by whoever holds the last heartbeat written:
//!
//! ```text
//! id = <item.id> AND status = PROCESSING AND heartbeat = <item.heartbeat>
//! ```
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    item::{Item, ItemStatus},
    store::{Filter, Update},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryBuilder {
    heartbeat_expiration: TimeDelta,
}

impl QueryBuilder {
    pub const fn new(heartbeat_expiration: TimeDelta) -> Self {
        Self {
            heartbeat_expiration,
        }
    }

    pub const fn heartbeat_expiration(&self) -> TimeDelta {
        self.heartbeat_expiration
    }

    pub fn claim(&self, now: DateTime<Utc>) -> Filter {
        // Expirations too large to subtract mean no lease ever expires.
        let expired = now
            .checked_sub_signed(self.heartbeat_expiration)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Filter::And(vec![
            Filter::RunDateAtOrBefore(now),
            Filter::Or(vec![
                Filter::StatusEqual(ItemStatus::Pending),
                Filter::And(vec![
                    Filter::StatusEqual(ItemStatus::Processing),
                    Filter::HeartbeatAtOrBefore(expired),
                ]),
                Filter::And(vec![
                    Filter::StatusEqual(ItemStatus::Processing),
                    Filter::HeartbeatMissing,
                ]),
            ]),
        ])
    }

    pub fn claim_update(&self, now: DateTime<Utc>) -> Update {
        Update::default()
            .status(ItemStatus::Processing)
            .heartbeat(now)
    }

    /// `None` when the item has never been claimed, in which case it cannot hold a lease.
    pub fn heartbeat_renewal<P>(&self, item: &Item<P>) -> Option<Filter> {
        item.heartbeat.map(|heartbeat| {
            Filter::And(vec![
                Filter::IdEquals(item.id.clone()),
                Filter::StatusEqual(ItemStatus::Processing),
                Filter::HeartbeatEqual(heartbeat),
            ])
        })
    }

    /// The new heartbeat always moves past `prior`, even within the same millisecond, so that a
    /// second renewal from the same snapshot can never match.
    pub fn renewal_update(&self, prior: DateTime<Utc>, now: DateTime<Utc>) -> Update {
        let next = prior
            .checked_add_signed(TimeDelta::milliseconds(1))
            .map_or(now, |next| next.max(now));
        Update::default().heartbeat(next)
    }

    pub fn status(&self, status: ItemStatus) -> Filter {
        Filter::StatusEqual(status)
    }

    pub fn delayed(&self, now: DateTime<Utc>) -> Filter {
        Filter::RunDateBefore(now)
    }
}

#[cfg(test)]
mod test {
    use chrono::SubsecRound;
    use serde_json::Map;

    use super::*;
    use crate::{document::Document, store::matches::Matches};

    const EXPIRATION: TimeDelta = TimeDelta::seconds(30);

    fn document(
        status: ItemStatus,
        run_date: DateTime<Utc>,
        heartbeat: Option<DateTime<Utc>>,
    ) -> Document {
        Document {
            status: Some(status.as_str().to_owned()),
            heartbeat,
            ..Document::pending(run_date, Map::new()).with_id("id".into())
        }
    }

    #[test]
    fn claim_matches_due_pending_items() {
        let now = Utc::now();
        let claim = QueryBuilder::new(EXPIRATION).claim(now);

        assert!(claim.matches(&document(ItemStatus::Pending, now, None)));
        assert!(claim.matches(&document(
            ItemStatus::Pending,
            now - TimeDelta::days(1),
            None
        )));
        assert!(!claim.matches(&document(
            ItemStatus::Pending,
            now + TimeDelta::milliseconds(1),
            None
        )));
    }

    #[test]
    fn claim_matches_expired_leases() {
        let now = Utc::now();
        let claim = QueryBuilder::new(EXPIRATION).claim(now);
        let run_date = now - TimeDelta::hours(1);

        assert!(claim.matches(&document(
            ItemStatus::Processing,
            run_date,
            Some(now - EXPIRATION)
        )));
        assert!(claim.matches(&document(
            ItemStatus::Processing,
            run_date,
            Some(now - EXPIRATION - TimeDelta::seconds(1))
        )));
        assert!(claim.matches(&document(ItemStatus::Processing, run_date, None)));
        assert!(!claim.matches(&document(
            ItemStatus::Processing,
            run_date,
            Some(now - EXPIRATION + TimeDelta::milliseconds(1))
        )));
        assert!(!claim.matches(&document(
            ItemStatus::Processing,
            now + TimeDelta::seconds(1),
            Some(now - EXPIRATION - TimeDelta::seconds(1))
        )));
    }

    #[test]
    fn heartbeat_renewal_requires_the_same_heartbeat() {
        let now = Utc::now();
        let queries = QueryBuilder::new(EXPIRATION);
        let item = Item {
            id: "id".into(),
            status: ItemStatus::Processing,
            run_date: now,
            heartbeat: Some(now),
            payload: (),
        };
        let renewal = queries.heartbeat_renewal(&item).unwrap();

        assert!(renewal.matches(&document(ItemStatus::Processing, now, Some(now))));
        assert!(!renewal.matches(&document(
            ItemStatus::Processing,
            now,
            Some(now + TimeDelta::milliseconds(1))
        )));
        assert!(!renewal.matches(&document(ItemStatus::Pending, now, Some(now))));
        assert!(!renewal.matches(&Document {
            id: Some("other".into()),
            ..document(ItemStatus::Processing, now, Some(now))
        }));
    }

    #[test]
    fn heartbeat_renewal_without_heartbeat() {
        let item = Item {
            id: "id".into(),
            status: ItemStatus::Pending,
            run_date: Utc::now(),
            heartbeat: None,
            payload: (),
        };

        assert_eq!(QueryBuilder::new(EXPIRATION).heartbeat_renewal(&item), None);
    }

    #[test]
    fn claim_with_an_unbounded_expiration() {
        let now = Utc::now();
        let claim = QueryBuilder::new(TimeDelta::milliseconds(i64::MAX)).claim(now);
        let run_date = now - TimeDelta::hours(1);

        assert!(claim.matches(&document(ItemStatus::Pending, run_date, None)));
        assert!(claim.matches(&document(ItemStatus::Processing, run_date, None)));
        assert!(!claim.matches(&document(
            ItemStatus::Processing,
            run_date,
            Some(now - TimeDelta::days(365 * 100))
        )));
    }

    #[test]
    fn renewal_moves_the_heartbeat_forward() {
        let now = Utc::now().trunc_subsecs(3);
        let queries = QueryBuilder::new(EXPIRATION);

        assert_eq!(
            queries.renewal_update(now - TimeDelta::seconds(5), now),
            Update::default().heartbeat(now)
        );
        assert_eq!(
            queries.renewal_update(now, now),
            Update::default().heartbeat(now + TimeDelta::milliseconds(1))
        );
        assert_eq!(
            queries.renewal_update(now + TimeDelta::seconds(1), now),
            Update::default().heartbeat(now + TimeDelta::seconds(1) + TimeDelta::milliseconds(1))
        );
    }

    #[test]
    fn delayed_is_strictly_before_now() {
        let now = Utc::now();
        let delayed = QueryBuilder::new(EXPIRATION).delayed(now);

        assert!(delayed.matches(&document(
            ItemStatus::Pending,
            now - TimeDelta::milliseconds(1),
            None
        )));
        assert!(!delayed.matches(&document(ItemStatus::Pending, now, None)));
    }
}
