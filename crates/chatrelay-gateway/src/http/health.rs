use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe with basic runtime metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let backends: Vec<&str> = state
        .host
        .backends
        .configured()
        .into_iter()
        .map(|k| k.as_str())
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "durable_store": state.host.store.is_durable(),
        "backends": backends,
        "pending_history_writes": state.relay.writer().pending(),
    }))
}
