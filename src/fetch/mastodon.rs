// src/fetch/mastodon.rs
//! Mastodon public-timeline source. Maps status JSON into `RawPost`,
//! stripping the paragraph wrapper the API puts around content.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::fetch::SocialSource;
use crate::model::RawPost;

/// Supplies a bearer token for the upstream API. Token acquisition is an
/// external concern; the default implementation hands back a static token
/// from configuration (dev setups run unauthenticated against the public
/// timeline).
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Static token from config, or none.
pub struct ConfigToken(pub Option<String>);

impl AccessTokenProvider for ConfigToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Deserialize)]
struct ApiAccount {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiAttachment {}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    id: Option<String>,
    content: Option<String>,
    account: Option<ApiAccount>,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    favourites_count: i64,
    #[serde(default)]
    reblogs_count: i64,
    url: Option<String>,
    #[serde(default)]
    media_attachments: Vec<ApiAttachment>,
}

pub struct MastodonSource {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
    token: Box<dyn AccessTokenProvider>,
}

impl MastodonSource {
    pub fn new(
        base_url: impl Into<String>,
        page_size: u32,
        timeout: Duration,
        token: Box<dyn AccessTokenProvider>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building upstream http client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            page_size,
            token,
        })
    }

    fn convert(status: ApiStatus) -> RawPost {
        let content = status
            .content
            .unwrap_or_default()
            .replace("<p>", "")
            .replace("</p>", "");
        RawPost {
            id: status
                .id
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            content,
            author: status
                .account
                .and_then(|a| a.username)
                .unwrap_or_else(|| "unknown".to_string()),
            platform: "mastodon".to_string(),
            timestamp: status.created_at.unwrap_or_else(Utc::now),
            hashtags: Vec::new(),
            like_count: status.favourites_count.max(0),
            retweet_count: status.reblogs_count.max(0),
            original_url: status.url.unwrap_or_default(),
            has_image: !status.media_attachments.is_empty(),
        }
    }
}

#[async_trait]
impl SocialSource for MastodonSource {
    async fn fetch_recent(&self) -> Result<Vec<RawPost>> {
        let url = format!(
            "{}/api/v1/timelines/public?limit={}",
            self.base_url.trim_end_matches('/'),
            self.page_size
        );

        let mut req = self.client.get(&url);
        if let Some(token) = self.token.access_token() {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .context("requesting public timeline")?
            .error_for_status()
            .context("timeline returned error status")?;

        let statuses: Vec<ApiStatus> = resp.json().await.context("parsing timeline json")?;
        Ok(statuses.into_iter().map(Self::convert).collect())
    }

    fn name(&self) -> &'static str {
        "mastodon"
    }
}
