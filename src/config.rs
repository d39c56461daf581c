// src/config.rs
//! Pipeline configuration: defaults, optional TOML file, env overrides.
//!
//! Resolution order (later wins): built-in defaults → `$SOCIAL_STREAM_CONFIG`
//! TOML file (or `config/pipeline.toml` if present) → environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_CONFIG_PATH: &str = "SOCIAL_STREAM_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

/// Channel carrying freshly fetched, unclassified batches.
pub const RAW_CHANNEL: &str = "raw-posts";
/// Channel carrying classified, spam-filtered batches.
pub const PROCESSED_CHANNEL: &str = "processed-posts";
/// Stream group live viewers join for push delivery.
pub const LIVE_GROUP: &str = "post-stream";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Upstream timeline base URL, e.g. `https://mastodon.social`.
    pub source_base_url: String,
    /// Optional bearer token for the upstream API.
    pub source_token: Option<String>,
    /// Max posts requested per upstream call.
    pub fetch_page_size: u32,
    /// Admission gate permits: max concurrent upstream calls.
    pub fetch_max_concurrent: usize,
    /// Per-source-key fetch cache TTL.
    pub fetch_cache_ttl: Duration,
    /// Upstream HTTP timeout.
    pub fetch_timeout: Duration,
    /// Collector tick interval.
    pub collect_interval: Duration,
    /// Fixed backoff after a failed collector iteration.
    pub collect_backoff: Duration,
    /// Worker cap for batch classification (0 = number of CPUs).
    pub classify_workers: usize,
    /// Feed store capacity.
    pub feed_capacity: usize,
    /// HTTP bind address.
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_base_url: "https://mastodon.social".to_string(),
            source_token: None,
            fetch_page_size: 5,
            fetch_max_concurrent: 5,
            fetch_cache_ttl: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(15),
            collect_interval: Duration::from_secs(60),
            collect_backoff: Duration::from_secs(30),
            classify_workers: 0,
            feed_capacity: 1000,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// TOML shape; every key optional so partial files work.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    source_base_url: Option<String>,
    source_token: Option<String>,
    fetch_page_size: Option<u32>,
    fetch_max_concurrent: Option<usize>,
    fetch_cache_ttl_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    collect_interval_secs: Option<u64>,
    collect_backoff_secs: Option<u64>,
    classify_workers: Option<usize>,
    feed_capacity: Option<usize>,
    bind_addr: Option<String>,
}

impl AppConfig {
    /// Load using env var path + fallbacks:
    /// 1) `$SOCIAL_STREAM_CONFIG`
    /// 2) `config/pipeline.toml`
    /// 3) defaults
    /// then apply env-var overrides on top.
    pub fn load() -> Result<Self> {
        let mut cfg = AppConfig::default();

        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            cfg.apply_file(&Self::read_file(&pb)?);
        } else {
            let pb = PathBuf::from(DEFAULT_CONFIG_PATH);
            if pb.exists() {
                cfg.apply_file(&Self::read_file(&pb)?);
            }
        }

        cfg.apply_env();
        Ok(cfg)
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn apply_file(&mut self, f: &FileConfig) {
        if let Some(v) = &f.source_base_url {
            self.source_base_url = v.clone();
        }
        if let Some(v) = &f.source_token {
            self.source_token = Some(v.clone());
        }
        if let Some(v) = f.fetch_page_size {
            self.fetch_page_size = v;
        }
        if let Some(v) = f.fetch_max_concurrent {
            self.fetch_max_concurrent = v.max(1);
        }
        if let Some(v) = f.fetch_cache_ttl_secs {
            self.fetch_cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = f.fetch_timeout_secs {
            self.fetch_timeout = Duration::from_secs(v.max(1));
        }
        if let Some(v) = f.collect_interval_secs {
            self.collect_interval = Duration::from_secs(v.max(1));
        }
        if let Some(v) = f.collect_backoff_secs {
            self.collect_backoff = Duration::from_secs(v.max(1));
        }
        if let Some(v) = f.classify_workers {
            self.classify_workers = v;
        }
        if let Some(v) = f.feed_capacity {
            self.feed_capacity = v.max(1);
        }
        if let Some(v) = &f.bind_addr {
            self.bind_addr = v.clone();
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SOURCE_BASE_URL") {
            self.source_base_url = v;
        }
        if let Ok(v) = std::env::var("SOURCE_TOKEN") {
            if !v.trim().is_empty() {
                self.source_token = Some(v);
            }
        }
        if let Some(v) = env_parse("FETCH_PAGE_SIZE") {
            self.fetch_page_size = v;
        }
        if let Some(v) = env_parse::<usize>("FETCH_MAX_CONCURRENT") {
            self.fetch_max_concurrent = v.max(1);
        }
        if let Some(v) = env_parse("FETCH_CACHE_TTL_SECS") {
            self.fetch_cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("FETCH_TIMEOUT_SECS") {
            self.fetch_timeout = Duration::from_secs(v.max(1));
        }
        if let Some(v) = env_parse::<u64>("COLLECT_INTERVAL_SECS") {
            self.collect_interval = Duration::from_secs(v.max(1));
        }
        if let Some(v) = env_parse::<u64>("COLLECT_BACKOFF_SECS") {
            self.collect_backoff = Duration::from_secs(v.max(1));
        }
        if let Some(v) = env_parse("CLASSIFY_WORKERS") {
            self.classify_workers = v;
        }
        if let Some(v) = env_parse::<usize>("FEED_CAPACITY") {
            self.feed_capacity = v.max(1);
        }
        if let Ok(v) = std::env::var("BIND_ADDR") {
            self.bind_addr = v;
        }
    }

    /// Effective classification worker count (config or detected CPUs).
    pub fn effective_classify_workers(&self) -> usize {
        if self.classify_workers > 0 {
            return self.classify_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
