//! Service-level handlers (health, status)

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

/// GET /health - Liveness check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /status - Shard, pool and counters of this server
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.status())
}
