//! A delayed job scheduler built on top of a shared document store.
//!
//! Many workers, possibly in many processes, share a single collection of scheduled items. The
//! [`Scheduler`] hands each ready item to exactly one of them at a time using nothing more than
//! the atomic find-and-update of the underlying [`store::Store`]:
//!
//! - [`Scheduler::schedule`] inserts an item as `PENDING` with a run date,
//! - [`Scheduler::peek`] claims one due item, moving it to `PROCESSING` and stamping a heartbeat,
//! - [`Scheduler::heartbeat`] extends the lease, but only while the caller still holds it,
//! - [`Scheduler::delete`] removes the item once it has been processed.
//!
//! There is no background process. A worker which dies simply stops heartbeating, and once the
//! heartbeat is older than the configured expiration the next [`Scheduler::peek`] will hand the
//! item to someone else.
//!
//! # Example
//!
//! ```
//! # use delayq::prelude::*;
//! # use chrono::{TimeDelta, Utc};
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Resize {
//!     image: String,
//! }
//!
//! let scheduler = Scheduler::new(
//!     InMemoryStore::new(),
//!     JsonCodec::<Resize>::new(),
//!     TimeDelta::seconds(30),
//! );
//! scheduler.setup().await.unwrap();
//!
//! scheduler
//!     .schedule(EnqueuableItem::new(Utc::now(), Resize { image: "cat.png".to_owned() }))
//!     .await
//!     .unwrap();
//!
//! if let Some(item) = scheduler.peek().await.unwrap() {
//!     // Long running work should call `scheduler.heartbeat(&item)` periodically.
//!     assert_eq!(item.payload.image, "cat.png");
//!     assert_eq!(scheduler.delete(&item).await.unwrap(), 1);
//! }
//! # });
//! ```
use thiserror::Error;

pub mod clock;
pub mod codec;
pub mod config;
pub mod document;
pub mod index;
pub mod item;
pub mod prelude;
pub mod query;
pub mod scheduler;
pub mod store;

pub use scheduler::Scheduler;

use codec::CodecError;
use item::ItemId;
use store::StoreError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Error communicating with the store")]
    StoreUnavailable(#[from] StoreError),
    #[error("Error decoding item")]
    Decode(#[source] CodecError),
    #[error("Error encoding item")]
    Encode(#[source] CodecError),
    #[error("Lease on {0} is no longer held")]
    LeaseLost(ItemId),
    #[error("`{0}` is not implemented")]
    NotImplemented(&'static str),
    #[error("Failed to create indexes")]
    SetupFailed(#[source] StoreError),
}
