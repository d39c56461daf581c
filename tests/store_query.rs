// tests/store_query.rs
//
// Feed store bounds and ordering: the capacity invariant must hold after
// every insert, and query order is recomputed (descending timestamp) no
// matter what order entries arrived in.

use chrono::{TimeZone, Utc};
use rand::seq::SliceRandom;
use social_stream::model::{FeedEntry, Sentiment};
use social_stream::store::FeedStore;

fn entry(id: &str, ts_secs: i64) -> FeedEntry {
    FeedEntry {
        id: id.to_string(),
        content: "content".to_string(),
        author: "author".to_string(),
        platform: "mastodon".to_string(),
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
fn inserting_capacity_plus_k_keeps_exactly_capacity() {
    let capacity = 50;
    let k = 7;
    let store = FeedStore::with_capacity(capacity);

    for i in 0..(capacity + k) as i64 {
        store.insert(entry(&format!("p{i}"), i));
        assert!(store.len() <= capacity, "cap exceeded after insert {i}");
    }

    assert_eq!(store.len(), capacity);
    // The k oldest inserts are gone, the rest are present.
    for i in 0..k as i64 {
        assert!(store.get_by_id(&format!("p{i}")).is_none());
    }
    for i in k as i64..(capacity + k) as i64 {
        assert!(store.get_by_id(&format!("p{i}")).is_some());
    }
}

#[test]
fn thousand_and_one_inserts_evict_the_first() {
    let store = FeedStore::with_capacity(1000);
    for i in 0..1001i64 {
        store.insert(entry(&format!("p{i}"), i));
    }
    assert_eq!(store.len(), 1000);

    let all = store.query(100);
    assert!(all.iter().all(|e| e.id != "p0"));
    assert!(store.get_by_id("p0").is_none());
}

#[test]
fn query_is_sorted_desc_for_any_insertion_order() {
    let store = FeedStore::with_capacity(200);

    let mut timestamps: Vec<i64> = (0..80).collect();
    timestamps.shuffle(&mut rand::rng());
    for ts in &timestamps {
        store.insert(entry(&format!("p{ts}"), *ts));
    }

    let result = store.query(80);
    assert_eq!(result.len(), 80);
    for pair in result.windows(2) {
        assert!(
            pair[0].timestamp >= pair[1].timestamp,
            "query result not descending"
        );
    }
}

#[test]
fn oversized_limit_is_clamped_not_rejected() {
    let store = FeedStore::with_capacity(300);
    for i in 0..150i64 {
        store.insert(entry(&format!("p{i}"), i));
    }
    assert_eq!(store.query(500).len(), 100);
}

#[test]
fn get_by_id_hits_and_misses() {
    let store = FeedStore::with_capacity(10);
    store.insert(entry("present", 1));
    assert_eq!(store.get_by_id("present").unwrap().id, "present");
    assert!(store.get_by_id("absent").is_none());
}
