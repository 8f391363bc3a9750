//! Admin listener: live event push and health
//!
//! `GET /events` upgrades to a WebSocket and forwards every bus event as one
//! JSON text frame. A client that falls behind skips ahead to current
//! events rather than being disconnected. `GET /model-info` is the
//! auxiliary context-window lookup; it never touches the proxy hot path.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use periscope_ai::ModelInfoCache;
use periscope_core::EventBus;
use periscope_store::SqliteStore;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub struct AdminState {
    pub bus: EventBus,
    pub store: Arc<SqliteStore>,
    pub model_info: Arc<ModelInfoCache>,
}

pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/events", get(events_upgrade))
        .route("/model-info", get(model_info))
        .with_state(Arc::new(state))
}

async fn healthz(State(state): State<Arc<AdminState>>) -> Json<serde_json::Value> {
    let request_count = state.store.request_count().await.ok();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "requests_logged": request_count,
    }))
}

async fn events_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AdminState>>,
) -> impl IntoResponse {
    let receiver = state.bus.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, receiver))
}

async fn handle_socket(
    socket: WebSocket,
    mut receiver: broadcast::Receiver<periscope_core::ProxyEvent>,
) {
    debug!("event observer connected");
    let (mut sink, mut stream) = socket.split();

    let forward = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if futures::SinkExt::send(&mut sink, Message::Text(text.into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Slow observer: drop the backlog, keep streaming.
                    warn!(skipped, "event observer lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Drain (and ignore) client frames until the socket closes.
    while let Some(message) = stream.next().await {
        if message.is_err() {
            break;
        }
    }
    forward.abort();
    debug!("event observer disconnected");
}

#[derive(Debug, Deserialize)]
struct ModelInfoParams {
    origin: String,
    model: String,
}

async fn model_info(
    Query(params): Query<ModelInfoParams>,
    State(state): State<Arc<AdminState>>,
) -> Json<serde_json::Value> {
    match state.model_info.lookup(&params.origin, &params.model).await {
        Some(info) => Json(serde_json::json!({"found": true, "model": info})),
        None => Json(serde_json::json!({"found": false})),
    }
}
