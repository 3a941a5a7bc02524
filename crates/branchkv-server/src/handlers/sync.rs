//! Anti-entropy handlers

use crate::{ApiError, AppState};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use branchkv_core::{
    rpc::{CompareRequest, CompareResponse, DownloadRequest, SyncRequest, UploadRequest},
    Location,
};
use std::sync::Arc;

/// GET /merkle/{location} - Merkle projection of a local subtree
pub async fn merkle_tree(
    State(state): State<Arc<AppState>>,
    Path(location): Path<u64>,
) -> Result<Response, ApiError> {
    let entries = state.coordinator.merkle_tree(Location(location))?;
    Ok(Json(entries).into_response())
}

/// POST /sync/download - Full local subtrees, parents first
pub async fn download(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DownloadRequest>,
) -> Result<Response, ApiError> {
    let nodes = state.coordinator.download(&request.locations)?;
    Ok(Json(nodes).into_response())
}

/// POST /sync/upload - Merge nodes into the local store
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadRequest>,
) -> Result<Response, ApiError> {
    let response = state.coordinator.upload(request.nodes).await?;
    Ok(Json(response).into_response())
}

/// POST /sync/compare - Topmost remote nodes missing here
pub async fn compare(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompareRequest>,
) -> impl IntoResponse {
    Json(CompareResponse {
        outdated: state.coordinator.compare(&request.entries),
    })
}

/// POST /sync/pull - Pull a peer's subtree into this server
pub async fn pull(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> Result<Response, ApiError> {
    let response = state.coordinator.pull(&request.peer, request.root).await?;
    Ok(Json(response).into_response())
}
