// src/bus.rs
//! # Message bus
//! In-process publish/subscribe broker bridging the pipeline stages.
//!
//! Each named channel is a `tokio::sync::broadcast` sender: messages reach
//! every live subscriber in publish order, a whole batch travels as one
//! message, and a subscriber that falls behind loses messages rather than
//! stalling the publisher (at-most-once). A networked broker can replace
//! this behind the same surface.

use anyhow::{Context, Result};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

/// Buffered messages per channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;
/// Probe slower than this is reported unhealthy, not just failures.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);
const HEALTH_CHANNEL: &str = "__health-probe";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("bus_published_total", "Batches published to the bus.");
        describe_counter!(
            "bus_dropped_total",
            "Messages lost to lagging subscribers."
        );
    });
}

pub struct MessageBus {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        ensure_metrics_described();
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        if let Some(tx) = self
            .channels
            .read()
            .expect("bus rwlock poisoned")
            .get(channel)
        {
            return tx.clone();
        }
        let mut map = self.channels.write().expect("bus rwlock poisoned");
        map.entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Serialize `items` as one JSON-array message and publish it atomically
    /// to `channel`. Empty input is a no-op. Returns the number of live
    /// subscribers the message reached; zero subscribers is logged, not an
    /// error. Serialization failure propagates to the caller.
    pub fn publish_batch<T: Serialize>(&self, channel: &str, items: &[T]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let payload = serde_json::to_string(items)
            .with_context(|| format!("serializing batch for channel {channel}"))?;

        counter!("bus_published_total", "channel" => channel.to_string()).increment(1);
        match self.sender(channel).send(payload) {
            Ok(receivers) => {
                tracing::debug!(channel, receivers, "published batch");
                Ok(receivers)
            }
            Err(_) => {
                tracing::warn!(channel, "published batch but no subscribers received it");
                Ok(0)
            }
        }
    }

    /// Subscribe to `channel`. Messages published after this call are
    /// delivered in publish order through the returned handle.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        Subscription {
            channel: channel.to_string(),
            rx: self.sender(channel).subscribe(),
        }
    }

    /// Liveness probe: a publish/receive round-trip on an internal channel
    /// must complete within a fixed latency bound. Slow counts as down.
    pub async fn is_healthy(&self) -> bool {
        let mut rx = self.subscribe(HEALTH_CHANNEL);
        if self.publish_batch(HEALTH_CHANNEL, &["ping"]).is_err() {
            return false;
        }
        tokio::time::timeout(HEALTH_TIMEOUT, rx.recv())
            .await
            .ok()
            .flatten()
            .is_some()
    }
}

/// Consumer side of one channel. Dropping it unsubscribes.
pub struct Subscription {
    channel: String,
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    /// Next message in publish order, or `None` once the bus side is gone.
    /// A lag (subscriber slower than the channel buffer) is logged and
    /// skipped — those messages are lost, per at-most-once delivery.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    counter!("bus_dropped_total", "channel" => self.channel.clone())
                        .increment(n);
                    tracing::warn!(channel = %self.channel, missed = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
