//! HTTP endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{domain::ConnectionRecord, ui::state::AppState};

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let connections = state.registry.count().await;
    Json(serde_json::json!({"status": "ok", "connections": connections}))
}

/// Debug endpoint listing the live connections (for testing purposes)
pub async fn debug_connections(State(state): State<Arc<AppState>>) -> Json<Vec<ConnectionRecord>> {
    Json(state.registry.connections().await)
}
