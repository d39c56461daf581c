// src/hub.rs
//! # Broadcast hub
//! Fan-out of accepted batches to every live subscriber of a stream group.
//! Membership changes race freely with broadcasts: a broadcast works off a
//! snapshot of the member list, and a member whose channel has closed is
//! pruned silently without affecting the rest.

use metrics::gauge;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;

use crate::model::FeedEntry;

/// Event name pushed to live viewers for each accepted batch.
pub const NEW_POSTS_EVENT: &str = "new_posts";

/// What a group member receives per broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    pub event: &'static str,
    pub posts: Vec<FeedEntry>,
}

type Members = HashMap<String, mpsc::UnboundedSender<StreamEvent>>;

#[derive(Default)]
pub struct BroadcastHub {
    groups: RwLock<HashMap<String, Members>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `member_id` in `group_id`, receiving events through the
    /// returned channel. Joining twice replaces the previous registration
    /// (idempotent from the member's point of view).
    pub fn join(&self, group_id: &str, member_id: &str) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut groups = self.groups.write().expect("hub rwlock poisoned");
        let members = groups.entry(group_id.to_string()).or_default();
        members.insert(member_id.to_string(), tx);
        gauge!("hub_members", "group" => group_id.to_string()).set(members.len() as f64);
        tracing::debug!(group = group_id, member = member_id, "member joined");
        rx
    }

    /// Remove `member_id` from `group_id`. Leaving twice, or leaving a group
    /// never joined, is a no-op.
    pub fn leave(&self, group_id: &str, member_id: &str) {
        let mut groups = self.groups.write().expect("hub rwlock poisoned");
        if let Some(members) = groups.get_mut(group_id) {
            if members.remove(member_id).is_some() {
                tracing::debug!(group = group_id, member = member_id, "member left");
            }
            gauge!("hub_members", "group" => group_id.to_string()).set(members.len() as f64);
            if members.is_empty() {
                groups.remove(group_id);
            }
        }
    }

    /// Remove the member from every group (implicit leave on disconnect).
    pub fn leave_all(&self, member_id: &str) {
        let mut groups = self.groups.write().expect("hub rwlock poisoned");
        for (group_id, members) in groups.iter_mut() {
            if members.remove(member_id).is_some() {
                gauge!("hub_members", "group" => group_id.clone()).set(members.len() as f64);
            }
        }
        groups.retain(|_, members| !members.is_empty());
    }

    /// Deliver `entries` to every current member of `group_id`. A member
    /// that disconnected mid-broadcast simply misses the batch; no error
    /// reaches the broadcaster. Returns how many members were reached.
    pub fn broadcast(&self, group_id: &str, entries: &[FeedEntry]) -> usize {
        if entries.is_empty() {
            return 0;
        }

        // Snapshot under the read lock, send outside it.
        let targets: Vec<(String, mpsc::UnboundedSender<StreamEvent>)> = {
            let groups = self.groups.read().expect("hub rwlock poisoned");
            match groups.get(group_id) {
                Some(members) => members
                    .iter()
                    .map(|(id, tx)| (id.clone(), tx.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut reached = 0;
        let mut gone: Vec<String> = Vec::new();
        for (member_id, tx) in targets {
            let event = StreamEvent {
                event: NEW_POSTS_EVENT,
                posts: entries.to_vec(),
            };
            if tx.send(event).is_ok() {
                reached += 1;
            } else {
                gone.push(member_id);
            }
        }
        for member_id in gone {
            self.leave(group_id, &member_id);
        }

        tracing::debug!(group = group_id, reached, posts = entries.len(), "broadcast batch");
        reached
    }
}
