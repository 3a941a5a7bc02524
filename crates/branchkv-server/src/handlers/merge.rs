//! Merge-function handlers

use crate::{ApiError, AppState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use branchkv_core::rpc::{GlobalMergeFunctionRequest, MergeFunctionRequest};
use std::sync::Arc;

/// POST /merge-functions - Bind a merge function to a location or a key
pub async fn set_merge_function(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MergeFunctionRequest>,
) -> Result<Response, ApiError> {
    state.coordinator.set_merge_function(request).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /merge-functions/global - Bind the fallback merge function
pub async fn set_global_merge_function(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GlobalMergeFunctionRequest>,
) -> Result<Response, ApiError> {
    state.coordinator.set_global_merge_function(request).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
