//! Social Stream — Binary Entrypoint
//! Boots the collector/processor/gateway loops and the Axum HTTP surface,
//! wiring every component explicitly (no hidden registry).

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use social_stream::api::{create_router, AppState};
use social_stream::bus::MessageBus;
use social_stream::classify::ContentClassifier;
use social_stream::config::AppConfig;
use social_stream::fetch::mastodon::{ConfigToken, MastodonSource};
use social_stream::fetch::RateLimitedFetcher;
use social_stream::hub::BroadcastHub;
use social_stream::metrics::Metrics;
use social_stream::pipeline::{PipelineDriver, Shutdown};
use social_stream::store::FeedStore;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("social_stream=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = Metrics::init();
    let config = AppConfig::load()?;

    // --- Wire the pipeline ---
    let source = MastodonSource::new(
        config.source_base_url.clone(),
        config.fetch_page_size,
        config.fetch_timeout,
        Box::new(ConfigToken(config.source_token.clone())),
    )?;
    let fetcher = Arc::new(RateLimitedFetcher::new(
        Arc::new(source),
        config.fetch_max_concurrent,
        config.fetch_cache_ttl,
    ));
    let classifier = ContentClassifier::new(config.effective_classify_workers());
    let bus = Arc::new(MessageBus::new());
    let store = Arc::new(FeedStore::with_capacity(config.feed_capacity));
    let hub = Arc::new(BroadcastHub::new());

    let driver = PipelineDriver {
        fetcher,
        classifier,
        bus: bus.clone(),
        store: store.clone(),
        hub: hub.clone(),
        config: config.clone(),
    };

    let (stop_tx, shutdown) = Shutdown::new();
    // Subscribers must exist before the first publish, so the consuming
    // loops go up before the collector.
    let gateway = driver.spawn_gateway(shutdown.clone());
    let processor = driver.spawn_processor(shutdown.clone());
    let collector = driver.spawn_collector(shutdown.clone());

    // --- HTTP surface ---
    let state = AppState { store, hub, bus };
    let router = create_router(state).merge(metrics.router());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    // Server is down; stop the loops and let in-flight work finish.
    let _ = stop_tx.send(true);
    let _ = collector.await;
    let _ = processor.await;
    let _ = gateway.await;

    tracing::info!("pipeline stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown requested");
    }
}
