use crate::document::Document;

use super::Filter;

pub(crate) trait Matches {
    fn matches(&self, document: &Document) -> bool;
}

impl Matches for Filter {
    fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::And(inner) => inner.iter().all(|filter| filter.matches(document)),
            Filter::Or(inner) => inner.iter().any(|filter| filter.matches(document)),
            Filter::IdEquals(id) => document.id.as_ref() == Some(id),
            Filter::StatusEqual(status) => document.status.as_deref() == Some(status.as_str()),
            Filter::RunDateAtOrBefore(instant) => {
                document.run_date.is_some_and(|run_date| run_date <= *instant)
            }
            Filter::RunDateBefore(instant) => {
                document.run_date.is_some_and(|run_date| run_date < *instant)
            }
            Filter::HeartbeatAtOrBefore(instant) => document
                .heartbeat
                .is_some_and(|heartbeat| heartbeat <= *instant),
            Filter::HeartbeatEqual(instant) => document.heartbeat == Some(*instant),
            Filter::HeartbeatMissing => document.heartbeat.is_none(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::ops::{Add, Sub};

    use chrono::{TimeDelta, Utc};
    use serde_json::Map;

    use super::*;
    use crate::item::ItemStatus;

    #[test]
    fn filter_matches() {
        let now = Utc::now();
        let document = Document::pending(now, Map::new()).with_id("id".into());

        let matching = [
            Filter::IdEquals("id".into()),
            Filter::StatusEqual(ItemStatus::Pending),
            Filter::RunDateAtOrBefore(now),
            Filter::RunDateBefore(now.add(TimeDelta::milliseconds(1))),
            Filter::HeartbeatMissing,
        ];
        matching
            .iter()
            .for_each(|filter| assert!(filter.matches(&document), "{filter:?}"));

        let non_matching = [
            Filter::IdEquals("other".into()),
            Filter::StatusEqual(ItemStatus::Processing),
            Filter::RunDateAtOrBefore(now.sub(TimeDelta::milliseconds(1))),
            Filter::RunDateBefore(now),
            Filter::HeartbeatAtOrBefore(now),
            Filter::HeartbeatEqual(now),
        ];
        non_matching
            .iter()
            .for_each(|filter| assert!(!filter.matches(&document), "{filter:?}"));

        assert!(Filter::And(matching.to_vec()).matches(&document));
        assert!(!Filter::Or(non_matching.to_vec()).matches(&document));

        let all: Vec<_> = matching.into_iter().chain(non_matching).collect();
        assert!(!Filter::And(all.clone()).matches(&document));
        assert!(Filter::Or(all).matches(&document));
    }

    #[test]
    fn heartbeat_filters() {
        let now = Utc::now();
        let document = Document {
            heartbeat: Some(now),
            ..Document::pending(now, Map::new())
        };

        assert!(Filter::HeartbeatEqual(now).matches(&document));
        assert!(Filter::HeartbeatAtOrBefore(now).matches(&document));
        assert!(!Filter::HeartbeatAtOrBefore(now.sub(TimeDelta::milliseconds(1))).matches(&document));
        assert!(!Filter::HeartbeatMissing.matches(&document));
    }
}
