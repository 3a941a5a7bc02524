//! Session handlers

use crate::{ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use branchkv_core::{
    rpc::{PropagateQuery, ResolveVirtualResponse},
    SessionId, VirtualLocation,
};
use std::sync::Arc;

/// GET /sessions/{session}/virtual/{virtual} - Real location of a handle known here
pub async fn resolve_virtual(
    State(state): State<Arc<AppState>>,
    Path((session_id, virtual_location)): Path<(SessionId, VirtualLocation)>,
) -> Result<Response, ApiError> {
    let location = state
        .coordinator
        .resolve_virtual(session_id, virtual_location)?;
    Ok(Json(ResolveVirtualResponse { location }).into_response())
}

/// DELETE /sessions/{session} - Drop a session's virtual handles
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<PropagateQuery>,
) -> Result<Response, ApiError> {
    state
        .coordinator
        .end_session(session_id, query.propagate)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
