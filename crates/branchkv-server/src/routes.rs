//! HTTP route definitions

use crate::{handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_body_size = state.config.max_body_size;

    Router::new()
        // Service endpoints
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::status))
        // Key/value
        .route("/kv/get", post(handlers::get))
        .route("/kv/set", post(handlers::set))
        // Routing table
        .route("/cluster/split", post(handlers::split))
        .route("/cluster/index", get(handlers::index))
        // Nodes
        .route("/nodes", post(handlers::add_nodes))
        .route(
            "/nodes/{location}",
            get(handlers::get_node).delete(handlers::remove_node),
        )
        .route(
            "/nodes/{location}/children",
            post(handlers::add_child).delete(handlers::remove_children),
        )
        // Merge functions
        .route("/merge-functions", post(handlers::set_merge_function))
        .route(
            "/merge-functions/global",
            post(handlers::set_global_merge_function),
        )
        // Anti-entropy
        .route("/merkle/{location}", get(handlers::merkle_tree))
        .route("/sync/download", post(handlers::download))
        .route("/sync/upload", post(handlers::upload))
        .route("/sync/compare", post(handlers::compare))
        .route("/sync/pull", post(handlers::pull))
        // Sessions
        .route(
            "/sessions/{session}/virtual/{virtual}",
            get(handlers::resolve_virtual),
        )
        .route("/sessions/{session}", delete(handlers::end_session))
        // Apply middleware
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{ActionInvoker, InvokerError};
    use crate::{Coordinator, LocalTransport, ServerConfig};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use branchkv_core::rpc::{ErrorBody, SetResponse, StatusResponse};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct NoActions;

    #[async_trait]
    impl ActionInvoker for NoActions {
        async fn invoke(&self, _action: &str, _payload: Value) -> Result<Value, InvokerError> {
            Err(InvokerError::NotConfigured)
        }
    }

    fn router() -> Router {
        let config = ServerConfig {
            self_address: "node-a".to_string(),
            ..Default::default()
        };
        let transport = LocalTransport::new();
        let coordinator = Arc::new(Coordinator::new(
            &config,
            Arc::new(transport.clone()),
            Arc::new(NoActions),
        ));
        transport.register(&coordinator);
        create_router(Arc::new(AppState::with_coordinator(config, coordinator)))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let app = router();

        let response = app
            .clone()
            .oneshot(post_json("/kv/set", json!({"data": {"k": "v"}, "dependency": 0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let SetResponse { location } = body_json(response).await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/kv/get",
                json!({"location": location, "keys": ["k"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response).await;
        assert_eq!(body["data"]["k"], "v");

        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status: StatusResponse = body_json(response).await;
        assert_eq!(status.nodes, 1);
        assert_eq!(status.address, "node-a");
    }

    #[tokio::test]
    async fn test_missing_key_is_json_404() {
        let app = router();
        let response = app
            .clone()
            .oneshot(post_json("/kv/set", json!({"data": {"k": "v"}})))
            .await
            .unwrap();
        let SetResponse { location } = body_json(response).await;

        let response = app
            .oneshot(post_json(
                "/kv/get",
                json!({"location": location, "keys": ["absent"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.code, "KeyNotFound");
        assert!(body.request_id.is_some());
    }

    #[tokio::test]
    async fn test_empty_set_rejected() {
        let response = router()
            .oneshot(post_json("/kv/set", json!({"data": {}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.code, "InvalidRequest");
    }

    #[tokio::test]
    async fn test_unknown_node_404() {
        let response = router()
            .oneshot(Request::get("/nodes/12345").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_covers_key_space() {
        let response = router()
            .oneshot(Request::get("/cluster/index").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: Value = body_json(response).await;
        let mappings = body["mappings"].as_array().unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0]["address"], "node-a");
    }
}
