//! Key/value handlers (Get, Set)

use crate::{ApiError, AppState};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use branchkv_core::rpc::{GetRequest, SetRequest};
use std::sync::Arc;

/// POST /kv/get - Resolve keys along a dependency chain
pub async fn get(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GetRequest>,
) -> Result<Response, ApiError> {
    let response = state.coordinator.get(request).await?;
    Ok(Json(response).into_response())
}

/// POST /kv/set - Write a node on top of a dependency
pub async fn set(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetRequest>,
) -> Result<Response, ApiError> {
    let response = state.coordinator.set(request).await?;
    Ok(Json(response).into_response())
}
