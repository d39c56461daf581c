// src/classify.rs
//! # Content Classifier
//! Cleans, tags, scores, and flags a single post; batch mode runs one task
//! per post under a bounded worker pool.
//!
//! The spam and sentiment classifiers are deliberately simple lexical
//! matchers over fixed tables. The tables and the tie rule (equal counts ⇒
//! neutral) are a policy contract; do not "improve" them.

use anyhow::{bail, Result};
use metrics::{counter, describe_counter, histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::model::{ProcessedPost, RawPost, Sentiment};

/// Substring matches against any of these mark a post as spam.
static SPAM_PHRASES: &[&str] = &[
    "buy now",
    "click here",
    "free money",
    "get rich",
    "limited time",
    "act fast",
    "urgent",
    "winner",
    "congratulations",
];

static POSITIVE_WORDS: &[&str] = &[
    "great",
    "awesome",
    "love",
    "amazing",
    "excellent",
    "wonderful",
    "fantastic",
    "brilliant",
    "perfect",
    "outstanding",
];

static NEGATIVE_WORDS: &[&str] = &[
    "hate",
    "terrible",
    "awful",
    "worst",
    "disgusting",
    "horrible",
    "disappointing",
    "frustrating",
    "annoying",
    "pathetic",
];

const MAX_HASHTAGS: usize = 10;
const MAX_AUTHOR_LEN: usize = 100;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").unwrap());

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("classify_posts_total", "Posts classified successfully.");
        describe_counter!("classify_spam_total", "Posts flagged as spam.");
        describe_counter!(
            "classify_failures_total",
            "Posts rejected by input validation."
        );
    });
}

/// Strip HTML-like tags, unescape the four required entities, collapse
/// whitespace runs, trim.
pub fn sanitize_content(content: &str) -> String {
    // Each tag becomes a single space so adjacent words don't fuse.
    let without_tags = RE_TAGS.replace_all(content, " ");

    let unescaped = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");

    RE_WS.replace_all(&unescaped, " ").trim().to_string()
}

/// `#`-prefixed word tokens from sanitized content: lowercased, first-seen
/// order, deduplicated, capped at 10.
pub fn extract_hashtags(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in RE_HASHTAG.find_iter(content) {
        let tag = m.as_str().to_lowercase();
        if !out.contains(&tag) {
            out.push(tag);
            if out.len() == MAX_HASHTAGS {
                break;
            }
        }
    }
    out
}

/// Presence count over a fixed term list: each listed term contributes at
/// most one hit, substring match on already-lowercased content.
fn count_hits(lower_content: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|t| lower_content.contains(*t)).count()
}

/// Strictly more positive hits ⇒ positive; strictly more negative ⇒
/// negative; equal (including 0–0) ⇒ neutral.
pub fn score_sentiment(content: &str) -> Sentiment {
    let lower = content.to_lowercase();
    let positive = count_hits(&lower, POSITIVE_WORDS);
    let negative = count_hits(&lower, NEGATIVE_WORDS);
    if positive > negative {
        Sentiment::Positive
    } else if negative > positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

/// Case-insensitive substring match against the spam phrase table.
pub fn is_spam_content(content: &str) -> bool {
    let lower = content.to_lowercase();
    SPAM_PHRASES.iter().any(|p| lower.contains(p))
}

/// Trim; empty ⇒ "unknown"; strip `<`, `>`, and the literal `script`
/// (single pass each); truncate to 100 chars.
pub fn sanitize_author(author: &str) -> String {
    let trimmed = author.trim();
    if trimmed.is_empty() {
        return "unknown".to_string();
    }
    let cleaned = trimmed.replace(['<', '>'], "").replace("script", "");
    cleaned.chars().take(MAX_AUTHOR_LEN).collect()
}

fn normalize_platform(platform: &str) -> String {
    let p = platform.trim().to_lowercase();
    if p.is_empty() {
        "unknown".to_string()
    } else {
        p
    }
}

#[derive(Debug, Clone)]
pub struct ContentClassifier {
    workers: usize,
}

impl ContentClassifier {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Classify a single post. Fails only when the id is empty or
    /// whitespace; batch callers skip such posts without aborting.
    pub fn classify(&self, raw: &RawPost) -> Result<ProcessedPost> {
        ensure_metrics_described();

        if raw.id.trim().is_empty() {
            counter!("classify_failures_total").increment(1);
            bail!("raw post has empty id");
        }

        let content = sanitize_content(&raw.content);
        let hashtags = extract_hashtags(&content);
        let sentiment = score_sentiment(&content);
        let is_spam = is_spam_content(&content);
        if is_spam {
            counter!("classify_spam_total").increment(1);
        }
        counter!("classify_posts_total").increment(1);

        Ok(ProcessedPost {
            id: raw.id.clone(),
            content,
            author: sanitize_author(&raw.author),
            platform: normalize_platform(&raw.platform),
            timestamp: raw.timestamp,
            hashtags,
            like_count: raw.like_count.max(0),
            retweet_count: raw.retweet_count.max(0),
            original_url: raw.original_url.clone(),
            has_image: raw.has_image,
            sentiment,
            is_spam,
            processed_at: chrono::Utc::now(),
        })
    }

    /// Classify a batch with bounded parallelism: one task per post, at most
    /// `workers` running at once. Output order is not guaranteed to match
    /// input order. A failing post is logged and excluded; the batch
    /// continues.
    pub async fn classify_batch(&self, raws: Vec<RawPost>) -> Vec<ProcessedPost> {
        let t0 = std::time::Instant::now();
        let gate = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        for raw in raws {
            let gate = gate.clone();
            let me = self.clone();
            set.spawn(async move {
                // Gate is never closed, so acquire cannot fail.
                let _permit = gate.acquire_owned().await.expect("classify gate closed");
                let id = raw.id.clone();
                (id, me.classify(&raw))
            });
        }

        let mut out = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(post))) => out.push(post),
                Ok((id, Err(e))) => {
                    tracing::error!(error = ?e, post_id = %id, "failed to classify post");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "classification task panicked");
                }
            }
        }

        histogram!("classify_batch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn raw(id: &str, content: &str) -> RawPost {
        RawPost {
            id: id.to_string(),
            content: content.to_string(),
            author: "alice".to_string(),
            platform: "Mastodon".to_string(),
            timestamp: Utc::now(),
            hashtags: vec![],
            like_count: 0,
            retweet_count: 0,
            original_url: String::new(),
            has_image: false,
        }
    }

    #[test]
    fn sanitize_strips_tags_and_entities() {
        let out = sanitize_content("<p>Hello&nbsp;&amp; <b>world</b></p>");
        assert_eq!(out, "Hello & world");
    }

    #[test]
    fn sanitize_is_idempotent_on_post_content() {
        for s in [
            "  Hello <p>world</p>&nbsp; ",
            "no markup at all",
            "spaces   and\ttabs",
            "",
        ] {
            let once = sanitize_content(s);
            assert_eq!(sanitize_content(&once), once);
        }
    }

    #[test]
    fn hashtags_lowercased_deduped_capped() {
        let tags = extract_hashtags("#Rust #rust #Tech news #tech");
        assert_eq!(tags, vec!["#rust", "#tech"]);

        let many: String = (0..15).map(|i| format!("#t{i} ")).collect();
        assert_eq!(extract_hashtags(&many).len(), 10);
    }

    #[test]
    fn sentiment_compares_hit_counts() {
        assert_eq!(score_sentiment("this is awesome and great"), Sentiment::Positive);
        assert_eq!(score_sentiment("terrible, just awful"), Sentiment::Negative);
        // One positive vs one negative term ⇒ tie ⇒ neutral.
        assert_eq!(score_sentiment("great but terrible"), Sentiment::Neutral);
        assert_eq!(score_sentiment("nothing notable here"), Sentiment::Neutral);
    }

    #[test]
    fn sentiment_counts_presence_not_repeats() {
        // "great" three times is still one hit; one distinct negative ties it.
        assert_eq!(
            score_sentiment("great great great but awful"),
            Sentiment::Neutral
        );
    }

    #[test]
    fn spam_matches_are_case_insensitive() {
        assert!(is_spam_content("BUY NOW while stocks last"));
        assert!(is_spam_content("you are a Winner"));
        assert!(!is_spam_content("buying now is fine")); // no phrase match
    }

    #[test]
    fn author_sanitize_rules() {
        assert_eq!(sanitize_author("  "), "unknown");
        // Angle brackets go first, then the literal "script" (one pass).
        assert_eq!(sanitize_author("<script>bob</script>"), "bob/");
        assert_eq!(sanitize_author("a".repeat(150).as_str()).len(), 100);
        assert_eq!(sanitize_author(" alice "), "alice");
    }

    #[test]
    fn classify_rejects_blank_id() {
        let c = ContentClassifier::new(2);
        assert!(c.classify(&raw("  ", "hello")).is_err());
        assert!(c.classify(&raw("1", "hello")).is_ok());
    }

    #[test]
    fn classify_clamps_counters_and_lowercases_platform() {
        let c = ContentClassifier::new(2);
        let mut r = raw("1", "hello");
        r.like_count = -3;
        r.retweet_count = -1;
        let p = c.classify(&r).unwrap();
        assert_eq!(p.like_count, 0);
        assert_eq!(p.retweet_count, 0);
        assert_eq!(p.platform, "mastodon");
    }

    #[tokio::test]
    async fn batch_skips_failures_and_keeps_ids() {
        let c = ContentClassifier::new(4);
        let input = vec![raw("1", "great stuff"), raw("", "dropped"), raw("2", "ok")];
        let out = c.classify_batch(input).await;
        assert_eq!(out.len(), 2);
        let mut ids: Vec<_> = out.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
