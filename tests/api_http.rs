// tests/api_http.rs
//
// HTTP-level tests for the query API without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /posts (default limit, explicit limit, clamping)
// - GET /posts/{id} (hit and 404)

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value as Json;
use std::sync::Arc;
use tower::ServiceExt as _; // for `oneshot`

use social_stream::api::{create_router, AppState};
use social_stream::bus::MessageBus;
use social_stream::hub::BroadcastHub;
use social_stream::model::{FeedEntry, Sentiment};
use social_stream::store::FeedStore;

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

fn entry(id: &str, ts_secs: i64) -> FeedEntry {
    FeedEntry {
        id: id.to_string(),
        content: "content".to_string(),
        author: "author".to_string(),
        platform: "mastodon".to_string(),
        timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
        hashtags: vec!["#tech".to_string()],
        like_count: 2,
        retweet_count: 1,
        original_url: String::new(),
        has_image: false,
        sentiment: Sentiment::Positive,
        processed_at: Utc::now(),
    }
}

/// Build the same Router the binary uses, over a store seeded with
/// `seed_count` entries.
fn test_router(seed_count: i64) -> Router {
    let store = Arc::new(FeedStore::with_capacity(1000));
    for i in 0..seed_count {
        store.insert(entry(&format!("p{i}"), i));
    }
    let state = AppState {
        store,
        hub: Arc::new(BroadcastHub::new()),
        bus: Arc::new(MessageBus::new()),
    };
    create_router(state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router(0);

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let body = String::from_utf8(bytes).expect("utf8");
    assert_eq!(body.trim(), "OK");
}

#[tokio::test]
async fn posts_default_limit_is_20() {
    let app = test_router(30);
    let (status, json) = get_json(app, "/posts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().expect("array").len(), 20);
}

#[tokio::test]
async fn posts_respects_explicit_limit_and_orders_newest_first() {
    let app = test_router(30);
    let (status, json) = get_json(app, "/posts?limit=5").await;
    assert_eq!(status, StatusCode::OK);

    let arr = json.as_array().expect("array");
    assert_eq!(arr.len(), 5);
    // Seeded timestamps ascend with the index, so the newest is p29.
    assert_eq!(arr[0]["id"], "p29");
    assert_eq!(arr[4]["id"], "p25");
}

#[tokio::test]
async fn posts_limit_is_clamped_to_100() {
    let app = test_router(150);
    let (status, json) = get_json(app, "/posts?limit=500").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().expect("array").len(), 100);
}

#[tokio::test]
async fn posts_limit_zero_is_raised_to_one() {
    let app = test_router(10);
    let (status, json) = get_json(app, "/posts?limit=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().expect("array").len(), 1);
}

#[tokio::test]
async fn post_by_id_round_trips_wire_fields() {
    let app = test_router(3);
    let (status, json) = get_json(app, "/posts/p1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "p1");
    assert_eq!(json["sentiment"], "positive");
    assert_eq!(json["likeCount"], 2);
    assert!(json.get("isSpam").is_none(), "spam flag is not exposed");
}

#[tokio::test]
async fn post_by_id_unknown_is_404() {
    let app = test_router(3);
    let req = Request::builder()
        .method("GET")
        .uri("/posts/nope")
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
