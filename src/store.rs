// src/store.rs
//! # Feed store
//! Bounded in-memory collection of accepted posts, queried newest-first.
//! One mutex serializes all access; at the stated cap this is nowhere near
//! a throughput bottleneck.

use metrics::gauge;
use std::sync::Mutex;

use crate::model::FeedEntry;

/// Hard ceiling on entries returned by a single query.
pub const MAX_QUERY_LIMIT: usize = 100;

pub struct FeedStore {
    inner: Mutex<Vec<FeedEntry>>,
    capacity: usize,
}

impl FeedStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Insert `entry` as most recent. Entries beyond capacity fall off the
    /// old end; the size bound holds before this returns.
    pub fn insert(&self, entry: FeedEntry) {
        let mut v = self.inner.lock().expect("feed store mutex poisoned");
        v.insert(0, entry);
        if v.len() > self.capacity {
            v.truncate(self.capacity);
        }
        gauge!("feed_store_size").set(v.len() as f64);
    }

    /// Up to `min(limit, 100)` entries by descending timestamp. Ordering is
    /// recomputed per query; ties break toward the most recently inserted
    /// (head insertion + stable sort).
    pub fn query(&self, limit: usize) -> Vec<FeedEntry> {
        let limit = limit.min(MAX_QUERY_LIMIT);
        let v = self.inner.lock().expect("feed store mutex poisoned");
        let mut snapshot = v.clone();
        snapshot.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        snapshot.truncate(limit);
        snapshot
    }

    pub fn get_by_id(&self, id: &str) -> Option<FeedEntry> {
        let v = self.inner.lock().expect("feed store mutex poisoned");
        v.iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("feed store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sentiment;
    use chrono::{TimeZone, Utc};

    fn entry(id: &str, ts_secs: i64) -> FeedEntry {
        FeedEntry {
            id: id.to_string(),
            content: "c".to_string(),
            author: "a".to_string(),
            platform: "p".to_string(),
            timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            hashtags: vec![],
            like_count: 0,
            retweet_count: 0,
            original_url: String::new(),
            has_image: false,
            sentiment: Sentiment::Neutral,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn capacity_is_enforced_with_oldest_evicted() {
        let store = FeedStore::with_capacity(3);
        for i in 0..5 {
            store.insert(entry(&i.to_string(), i));
        }
        assert_eq!(store.len(), 3);
        assert!(store.get_by_id("0").is_none());
        assert!(store.get_by_id("1").is_none());
        assert!(store.get_by_id("4").is_some());
    }

    #[test]
    fn query_sorts_by_timestamp_desc_regardless_of_insertion() {
        let store = FeedStore::with_capacity(10);
        store.insert(entry("mid", 200));
        store.insert(entry("old", 100));
        store.insert(entry("new", 300));
        let ids: Vec<_> = store.query(10).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn equal_timestamps_break_toward_latest_insert() {
        let store = FeedStore::with_capacity(10);
        store.insert(entry("first", 100));
        store.insert(entry("second", 100));
        let ids: Vec<_> = store.query(10).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn query_limit_is_clamped_to_100() {
        let store = FeedStore::with_capacity(500);
        for i in 0..150 {
            store.insert(entry(&i.to_string(), i));
        }
        assert_eq!(store.query(500).len(), 100);
        assert_eq!(store.query(7).len(), 7);
    }
}
