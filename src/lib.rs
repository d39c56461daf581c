// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod bus;
pub mod classify;
pub mod config;
pub mod fetch;
pub mod hub;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::bus::MessageBus;
pub use crate::classify::ContentClassifier;
pub use crate::config::AppConfig;
pub use crate::fetch::RateLimitedFetcher;
pub use crate::hub::BroadcastHub;
pub use crate::model::{FeedEntry, ProcessedPost, RawPost, Sentiment};
pub use crate::pipeline::{PipelineDriver, Shutdown};
pub use crate::store::FeedStore;
