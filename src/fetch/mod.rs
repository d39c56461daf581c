// src/fetch/mod.rs
//! # Rate-limited fetcher
//! Bounds concurrent upstream calls with a counting admission gate and
//! caches recent results per source key.

pub mod mastodon;

use anyhow::Result;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::model::RawPost;

/// An upstream social feed. Implementations own their HTTP client, auth,
/// and response mapping; errors bubble up and are absorbed by the fetcher.
#[async_trait::async_trait]
pub trait SocialSource: Send + Sync {
    async fn fetch_recent(&self) -> Result<Vec<RawPost>>;
    fn name(&self) -> &'static str;
}

struct CacheEntry {
    posts: Vec<RawPost>,
    expires_at: Instant,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_calls_total", "Upstream fetch calls executed.");
        describe_counter!("fetch_cache_hits_total", "Fetches served from cache.");
        describe_counter!("fetch_errors_total", "Upstream fetch failures.");
    });
}

/// Caps in-flight upstream calls at a fixed permit count and serves repeat
/// requests for the same key from a TTL cache. Safe for concurrent use.
pub struct RateLimitedFetcher {
    source: Arc<dyn SocialSource>,
    gate: Semaphore,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl RateLimitedFetcher {
    pub fn new(source: Arc<dyn SocialSource>, max_concurrent: usize, ttl: Duration) -> Self {
        Self {
            source,
            gate: Semaphore::new(max_concurrent.max(1)),
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Fetch recent posts for `source_key`. Never fails: upstream errors are
    /// logged, counted, and converted into an empty batch.
    ///
    /// Cache hits return without consuming a permit. Expired entries are
    /// discarded lazily on lookup.
    pub async fn fetch_recent(&self, source_key: &str) -> Vec<RawPost> {
        ensure_metrics_described();

        if let Some(cached) = self.cache_lookup(source_key) {
            counter!("fetch_cache_hits_total").increment(1);
            return cached;
        }

        // Permit is held for the duration of the upstream call and released
        // on every path when the guard drops.
        let _permit = self.gate.acquire().await.expect("fetch gate closed");
        counter!("fetch_calls_total").increment(1);

        match self.source.fetch_recent().await {
            Ok(posts) => {
                self.cache_store(source_key, posts.clone());
                posts
            }
            Err(e) => {
                counter!("fetch_errors_total").increment(1);
                tracing::error!(error = ?e, source = self.source.name(), "upstream fetch failed");
                Vec::new()
            }
        }
    }

    fn cache_lookup(&self, key: &str) -> Option<Vec<RawPost>> {
        let mut cache = self.cache.lock().expect("fetch cache mutex poisoned");
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.posts.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn cache_store(&self, key: &str, posts: Vec<RawPost>) {
        let mut cache = self.cache.lock().expect("fetch cache mutex poisoned");
        cache.insert(
            key.to_string(),
            CacheEntry {
                posts,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}
