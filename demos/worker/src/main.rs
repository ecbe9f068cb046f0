use std::time::Duration;

use chrono::{TimeDelta, Utc};
use delayq::prelude::*;
use delayq_mongodb::MongoStore;
use serde::{Deserialize, Serialize};

const DATABASE_URL: &str = "DELAYQ_MONGODB_URL";
const WORKERS: usize = 4;
const ITEMS: i64 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct Thumbnail {
    image: String,
    size: u32,
}

#[tokio::main]
pub async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = SchedulerConfig::new()
        .with_collection("thumbnails")
        .with_heartbeat_expiration(TimeDelta::seconds(2));

    match std::env::var(DATABASE_URL) {
        Ok(url) => {
            let store = MongoStore::connect(&url, &config).await.unwrap();
            run(Scheduler::from_config(store, JsonCodec::new(), &config)).await;
        }
        Err(_) => {
            tracing::info!("{DATABASE_URL} not set, using an in-memory store");
            run(Scheduler::from_config(InMemoryStore::new(), JsonCodec::new(), &config)).await;
        }
    }
}

async fn run<S: Store + 'static>(scheduler: Scheduler<S, JsonCodec<Thumbnail>>) {
    scheduler.setup().await.unwrap();

    for n in 0..ITEMS {
        let id = scheduler
            .schedule(EnqueuableItem::new(
                Utc::now() + TimeDelta::milliseconds(n * 150),
                Thumbnail {
                    image: format!("image-{n}.png"),
                    size: 128,
                },
            ))
            .await
            .unwrap();
        println!("Scheduled {id}");
    }

    let workers = (0..WORKERS).map(|worker| tokio::spawn(work(worker, scheduler.clone())));
    futures::future::join_all(workers).await;
}

async fn work<S: Store>(worker: usize, scheduler: Scheduler<S, JsonCodec<Thumbnail>>) {
    loop {
        let Some(item) = scheduler.peek().await.unwrap() else {
            let remaining = scheduler.count_by_status(ItemStatus::Pending).await.unwrap()
                + scheduler.count_by_status(ItemStatus::Processing).await.unwrap();
            if remaining == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            continue;
        };

        println!(
            "worker {worker} resizing {} to {}px",
            item.payload.image, item.payload.size
        );
        // Two slices of work with a lease renewal in between.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let item = match scheduler.heartbeat(&item).await {
            Ok(item) => item,
            Err(err) => {
                tracing::warn!(%err, "worker {worker} abandoning item");
                continue;
            }
        };
        tokio::time::sleep(Duration::from_millis(300)).await;

        scheduler.delete(&item).await.unwrap();
    }
}
