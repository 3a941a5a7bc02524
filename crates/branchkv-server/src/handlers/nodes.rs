//! Node handlers used by splits, merges and digest refresh

use crate::{ApiError, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use branchkv_core::{
    rpc::{AddChildRequest, AddNodesRequest, AddNodesResponse, RemoveChildrenResponse},
    Location,
};
use std::sync::Arc;

/// POST /nodes - Store nodes at their owners
pub async fn add_nodes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddNodesRequest>,
) -> Result<Response, ApiError> {
    let stored = state.coordinator.add_nodes(request.nodes).await?;
    Ok(Json(AddNodesResponse { stored }).into_response())
}

/// GET /nodes/{location} - Fetch a node
pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(location): Path<u64>,
) -> Result<Response, ApiError> {
    let node = state.coordinator.get_node(Location(location)).await?;
    Ok(Json(node).into_response())
}

/// DELETE /nodes/{location} - Tombstone a node
pub async fn remove_node(
    State(state): State<Arc<AppState>>,
    Path(location): Path<u64>,
) -> Result<Response, ApiError> {
    state.coordinator.remove_node(Location(location)).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /nodes/{location}/children - Attach or refresh a child entry
pub async fn add_child(
    State(state): State<Arc<AppState>>,
    Path(location): Path<u64>,
    Json(request): Json<AddChildRequest>,
) -> Result<Response, ApiError> {
    let parent = state
        .coordinator
        .add_child(Location(location), request.child)
        .await?;
    Ok(Json(parent).into_response())
}

/// DELETE /nodes/{location}/children - Detach and tombstone every child
pub async fn remove_children(
    State(state): State<Arc<AppState>>,
    Path(location): Path<u64>,
) -> Result<Response, ApiError> {
    let removed = state
        .coordinator
        .remove_children(Location(location))
        .await?;
    Ok(Json(RemoveChildrenResponse { removed }).into_response())
}
