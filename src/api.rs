// src/api.rs
//! # Query API + live stream
//! Read side of the pipeline: recent-posts queries against the feed store,
//! a WebSocket endpoint for push delivery of newly accepted batches, and a
//! transport-backed health probe. The query surface never reflects pipeline
//! health; an outage shows up only as a pause in new content.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::bus::MessageBus;
use crate::config::LIVE_GROUP;
use crate::hub::BroadcastHub;
use crate::model::FeedEntry;
use crate::store::FeedStore;

const DEFAULT_QUERY_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FeedStore>,
    pub hub: Arc<BroadcastHub>,
    pub bus: Arc<MessageBus>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/posts", get(recent_posts))
        .route("/posts/{id}", get(post_by_id))
        .route("/stream", get(stream_upgrade))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if state.bus.is_healthy().await {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "transport unhealthy")
    }
}

#[derive(Deserialize)]
struct PostsQuery {
    limit: Option<usize>,
}

/// `GET /posts?limit=N` — newest first, `N` clamped to [1, 100], default 20.
async fn recent_posts(
    State(state): State<AppState>,
    Query(q): Query<PostsQuery>,
) -> Json<Vec<FeedEntry>> {
    let limit = q.limit.unwrap_or(DEFAULT_QUERY_LIMIT).max(1);
    let posts = state.store.query(limit);
    tracing::debug!(count = posts.len(), "returned recent posts");
    Json(posts)
}

/// `GET /posts/{id}` — single entry or 404.
async fn post_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FeedEntry>, (StatusCode, String)> {
    match state.store.get_by_id(&id) {
        Some(entry) => Ok(Json(entry)),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("Post with ID {id} not found"),
        )),
    }
}

/// Client → server control messages on the stream socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum StreamAction {
    Join { group: Option<String> },
    Leave { group: Option<String> },
}

async fn stream_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream_socket(state, socket))
}

/// One task per viewer connection. The select loop multiplexes client
/// control messages with events pushed by the hub; closing the socket (or
/// any send failure) leaves all groups.
async fn handle_stream_socket(state: AppState, mut socket: WebSocket) {
    let member_id = uuid::Uuid::new_v4().to_string();
    let mut events: Option<tokio::sync::mpsc::UnboundedReceiver<crate::hub::StreamEvent>> = None;

    tracing::debug!(member = %member_id, "stream client connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<StreamAction>(&text) {
                            Ok(StreamAction::Join { group }) => {
                                let group = group.unwrap_or_else(|| LIVE_GROUP.to_string());
                                events = Some(state.hub.join(&group, &member_id));
                            }
                            Ok(StreamAction::Leave { group }) => {
                                let group = group.unwrap_or_else(|| LIVE_GROUP.to_string());
                                state.hub.leave(&group, &member_id);
                            }
                            Err(e) => {
                                tracing::debug!(error = ?e, "unsupported stream message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            event = recv_event(&mut events) => {
                match event {
                    Some(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(p) => p,
                            Err(e) => {
                                tracing::error!(error = ?e, "failed to serialize stream event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    // Hub side gone for this member; wait for client action.
                    None => events = None,
                }
            }
        }
    }

    state.hub.leave_all(&member_id);
    tracing::debug!(member = %member_id, "stream client disconnected");
}

/// Await the next hub event, or pend forever while not joined so the select
/// stays driven by the socket alone.
async fn recv_event(
    events: &mut Option<tokio::sync::mpsc::UnboundedReceiver<crate::hub::StreamEvent>>,
) -> Option<crate::hub::StreamEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
