// src/model.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentiment label assigned by the classifier.
/// Serialized lowercase on the wire ("positive" | "negative" | "neutral").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// A post as retrieved from the upstream source, before classification.
/// Immutable once created; `hashtags` is best-effort and recomputed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPost {
    pub id: String,
    pub content: String,
    pub author: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub retweet_count: i64,
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub has_image: bool,
}

/// A post after sanitization, tagging, and classification.
/// `content` holds sanitized text, never the raw markup.
/// Created exactly once per RawPost; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedPost {
    pub id: String,
    pub content: String,
    pub author: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    pub hashtags: Vec<String>,
    pub like_count: i64,
    pub retweet_count: i64,
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub has_image: bool,
    pub sentiment: Sentiment,
    pub is_spam: bool,
    pub processed_at: DateTime<Utc>,
}

/// The externally visible subset of a processed post. Spam posts are
/// filtered before storage, so the flag itself is not exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub id: String,
    pub content: String,
    pub author: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    pub hashtags: Vec<String>,
    pub like_count: i64,
    pub retweet_count: i64,
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub has_image: bool,
    pub sentiment: Sentiment,
    pub processed_at: DateTime<Utc>,
}

impl From<ProcessedPost> for FeedEntry {
    fn from(p: ProcessedPost) -> Self {
        FeedEntry {
            id: p.id,
            content: p.content,
            author: p.author,
            platform: p.platform,
            timestamp: p.timestamp,
            hashtags: p.hashtags,
            like_count: p.like_count,
            retweet_count: p.retweet_count,
            original_url: p.original_url,
            has_image: p.has_image,
            sentiment: p.sentiment,
            processed_at: p.processed_at,
        }
    }
}
