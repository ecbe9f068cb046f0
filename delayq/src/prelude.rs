//! The purpose of this module is to alleviate the need to import many of the `[delayq]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use delayq::prelude::*;
//! ```
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::codec::{Codec, JsonCodec};
pub use crate::config::SchedulerConfig;
pub use crate::item::{EnqueuableItem, Item, ItemId, ItemStatus};
pub use crate::store::memory::InMemoryStore;
pub use crate::store::Store;
pub use crate::Scheduler;
pub use crate::SchedulerError;
