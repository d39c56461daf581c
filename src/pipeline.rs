// src/pipeline.rs
//! # Pipeline driver
//! Wires fetcher → classifier → store/hub through the bus as independent,
//! cancellable loops:
//!
//! - collector: fetch on a fixed interval, publish raw batches
//! - processor: classify raw batches, drop spam, publish survivors
//! - gateway: store accepted entries and fan them out to live viewers
//!
//! Every loop checks the shutdown signal at the top of each iteration and
//! around each suspension point; an in-flight fetch or publish completes
//! naturally, it is never force-aborted.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::MessageBus;
use crate::classify::ContentClassifier;
use crate::config::{AppConfig, LIVE_GROUP, PROCESSED_CHANNEL, RAW_CHANNEL};
use crate::fetch::RateLimitedFetcher;
use crate::hub::BroadcastHub;
use crate::model::{FeedEntry, ProcessedPost, RawPost};
use crate::store::FeedStore;

/// Source key the collector fetches under; also the cache key.
const SOURCE_KEY: &str = "mastodon";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collector_runs_total", "Collector iterations executed.");
        describe_counter!("collector_errors_total", "Collector iterations that failed.");
        describe_counter!(
            "processor_malformed_total",
            "Raw-channel messages dropped as malformed."
        );
        describe_counter!("processor_spam_filtered_total", "Posts dropped as spam.");
        describe_counter!("gateway_stored_total", "Entries inserted into the feed store.");
        describe_gauge!("pipeline_last_collect_ts", "Unix ts of the last collector run.");
    });
}

/// Cooperative shutdown signal shared by all loops.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns the trigger handle and the signal to hand to loops.
    pub fn new() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { rx })
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is requested.
    pub async fn triggered(&mut self) {
        // An Err means the sender is gone, which is shutdown too.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

pub struct PipelineDriver {
    pub fetcher: Arc<RateLimitedFetcher>,
    pub classifier: ContentClassifier,
    pub bus: Arc<MessageBus>,
    pub store: Arc<FeedStore>,
    pub hub: Arc<BroadcastHub>,
    pub config: AppConfig,
}

impl PipelineDriver {
    /// Spawn the collector loop: fetch recent posts then publish the batch
    /// to the raw channel, once per interval. Failures log and back off for
    /// a fixed period; shutdown exits cleanly.
    pub fn spawn_collector(&self, shutdown: Shutdown) -> JoinHandle<()> {
        ensure_metrics_described();
        let fetcher = self.fetcher.clone();
        let bus = self.bus.clone();
        let interval = self.config.collect_interval;
        let backoff = self.config.collect_backoff;

        tokio::spawn(async move {
            let mut shutdown = shutdown;
            tracing::info!(interval_secs = interval.as_secs(), "collector started");

            while !shutdown.is_shutdown() {
                counter!("collector_runs_total").increment(1);
                gauge!("pipeline_last_collect_ts").set(chrono::Utc::now().timestamp() as f64);

                let posts = fetcher.fetch_recent(SOURCE_KEY).await;
                let pause = match publish_raw(&bus, &posts) {
                    Ok(_) => interval,
                    Err(e) => {
                        counter!("collector_errors_total").increment(1);
                        tracing::error!(error = ?e, "collector iteration failed");
                        backoff
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = shutdown.triggered() => break,
                }
            }
            tracing::info!("collector stopped");
        })
    }

    /// Spawn the processor loop: consume raw batches, classify with bounded
    /// parallelism, drop spam, publish survivors. Malformed messages are
    /// logged and dropped without touching the subscription.
    pub fn spawn_processor(&self, shutdown: Shutdown) -> JoinHandle<()> {
        ensure_metrics_described();
        let classifier = self.classifier.clone();
        let bus = self.bus.clone();
        let mut sub = self.bus.subscribe(RAW_CHANNEL);

        tokio::spawn(async move {
            let mut shutdown = shutdown;
            tracing::info!(channel = RAW_CHANNEL, "processor started");

            loop {
                let message = tokio::select! {
                    msg = sub.recv() => match msg {
                        Some(m) => m,
                        None => break,
                    },
                    _ = shutdown.triggered() => break,
                };

                let raws: Vec<RawPost> = match serde_json::from_str(&message) {
                    Ok(v) => v,
                    Err(e) => {
                        counter!("processor_malformed_total").increment(1);
                        tracing::error!(error = ?e, "invalid raw-posts message, dropping");
                        continue;
                    }
                };
                if raws.is_empty() {
                    continue;
                }

                let processed = classifier.classify_batch(raws).await;
                let classified = processed.len();
                let survivors: Vec<ProcessedPost> =
                    processed.into_iter().filter(|p| !p.is_spam).collect();
                let spam = classified - survivors.len();
                counter!("processor_spam_filtered_total").increment(spam as u64);

                if survivors.is_empty() {
                    tracing::info!(classified, "all posts in batch filtered");
                    continue;
                }

                // An undelivered batch is lost, not queued: log and move on.
                match bus.publish_batch(PROCESSED_CHANNEL, &survivors) {
                    Ok(_) => {
                        tracing::info!(clean = survivors.len(), spam, "published clean posts")
                    }
                    Err(e) => tracing::error!(error = ?e, "failed to publish processed batch"),
                }
            }
            tracing::info!("processor stopped");
        })
    }

    /// Spawn the gateway loop: consume processed batches, insert every entry
    /// into the feed store, then broadcast the batch to the live group.
    pub fn spawn_gateway(&self, shutdown: Shutdown) -> JoinHandle<()> {
        ensure_metrics_described();
        let store = self.store.clone();
        let hub = self.hub.clone();
        let mut sub = self.bus.subscribe(PROCESSED_CHANNEL);

        tokio::spawn(async move {
            let mut shutdown = shutdown;
            tracing::info!(channel = PROCESSED_CHANNEL, "gateway started");

            loop {
                let message = tokio::select! {
                    msg = sub.recv() => match msg {
                        Some(m) => m,
                        None => break,
                    },
                    _ = shutdown.triggered() => break,
                };

                let posts: Vec<ProcessedPost> = match serde_json::from_str(&message) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::error!(error = ?e, "invalid processed-posts message, dropping");
                        continue;
                    }
                };

                let entries: Vec<FeedEntry> = posts.into_iter().map(FeedEntry::from).collect();
                for entry in &entries {
                    store.insert(entry.clone());
                }
                counter!("gateway_stored_total").increment(entries.len() as u64);

                hub.broadcast(LIVE_GROUP, &entries);
            }
            tracing::info!("gateway stopped");
        })
    }
}

fn publish_raw(bus: &MessageBus, posts: &[RawPost]) -> anyhow::Result<()> {
    if posts.is_empty() {
        tracing::debug!("no posts collected this cycle");
        return Ok(());
    }
    let receivers = bus.publish_batch(RAW_CHANNEL, posts)?;
    tracing::info!(count = posts.len(), receivers, "published raw posts");
    Ok(())
}
