//! Routing-table handlers

use crate::{ApiError, AppState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use branchkv_core::rpc::{IndexResponse, SplitRequest};
use std::sync::Arc;

/// POST /cluster/split - Apply a range split
pub async fn split(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SplitRequest>,
) -> Result<Response, ApiError> {
    state.coordinator.apply_split(request).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /cluster/index - Current routing table
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(IndexResponse {
        mappings: state.coordinator.index().mappings().to_vec(),
    })
}
