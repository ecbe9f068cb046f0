//! Configuration shared by the scheduler and the store implementations.
//!
//! # Example
//!
//! ```
//! # use delayq::config::SchedulerConfig;
//! # use chrono::TimeDelta;
//! let config = SchedulerConfig::new()
//!     .with_database("jobs")
//!     .with_collection("emails")
//!     .with_heartbeat_expiration(TimeDelta::seconds(30));
//!
//! assert_eq!(config.heartbeat_expiration_millis, 30_000);
//! ```
use chrono::TimeDelta;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub database: String,
    pub collection: String,
    /// How long a lease lasts without a heartbeat before the item can be claimed again.
    pub heartbeat_expiration_millis: u64,
}

impl SchedulerConfig {
    pub const DEFAULT_DATABASE: &'static str = "delayq";
    pub const DEFAULT_COLLECTION: &'static str = "items";
    pub const DEFAULT_HEARTBEAT_EXPIRATION_MILLIS: u64 = 5 * 60 * 1000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self
        }
    }

    pub fn with_collection(self, collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..self
        }
    }

    /// Negative expirations are treated as zero.
    pub fn with_heartbeat_expiration(self, expiration: TimeDelta) -> Self {
        Self {
            heartbeat_expiration_millis: expiration.num_milliseconds().max(0) as u64,
            ..self
        }
    }

    pub fn heartbeat_expiration(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.heartbeat_expiration_millis.min(i64::MAX as u64) as i64)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            database: Self::DEFAULT_DATABASE.to_owned(),
            collection: Self::DEFAULT_COLLECTION.to_owned(),
            heartbeat_expiration_millis: Self::DEFAULT_HEARTBEAT_EXPIRATION_MILLIS,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = SchedulerConfig::default();

        assert_eq!(config.database, "delayq");
        assert_eq!(config.collection, "items");
        assert_eq!(config.heartbeat_expiration(), TimeDelta::minutes(5));
    }

    #[test]
    fn deserialize_fills_in_missing_fields() {
        let config: SchedulerConfig = serde_json::from_str(
            r#"{ "collection": "emails", "heartbeat_expiration_millis": 1500 }"#,
        )
        .unwrap();

        assert_eq!(config.database, "delayq");
        assert_eq!(config.collection, "emails");
        assert_eq!(config.heartbeat_expiration(), TimeDelta::milliseconds(1500));
    }

    #[test]
    fn negative_expiration_is_clamped() {
        let config = SchedulerConfig::new().with_heartbeat_expiration(TimeDelta::seconds(-1));

        assert_eq!(config.heartbeat_expiration(), TimeDelta::zero());
    }
}
