//! In-process peer transport
//!
//! Connects coordinators living in one process, so a whole cluster can run
//! inside a test. Calls go straight to the peer's coordinator; errors are
//! converted to what the HTTP transport would have reported.

use crate::coordinator::Coordinator;
use crate::error::{ApiError, ErrorCode};
use async_trait::async_trait;
use branchkv_client::{ClientError, PeerTransport, Result};
use branchkv_core::{
    rpc::*, Child, Location, MerkleEntry, Node, SessionId, VirtualLocation,
};
use dashmap::{DashMap, DashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Routes peer calls to registered in-process coordinators
#[derive(Clone, Debug, Default)]
pub struct LocalTransport {
    peers: Arc<DashMap<String, Weak<Coordinator>>>,
    down: Arc<DashSet<String>>,
    latency: Arc<DashMap<String, Duration>>,
}

impl LocalTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a coordinator reachable under its address
    pub fn register(&self, coordinator: &Arc<Coordinator>) {
        self.peers
            .insert(coordinator.address().to_string(), Arc::downgrade(coordinator));
    }

    /// Simulate a network partition of `address`
    pub fn disconnect(&self, address: &str) {
        self.down.insert(address.to_string());
    }

    /// Undo [`disconnect`](Self::disconnect)
    pub fn reconnect(&self, address: &str) {
        self.down.remove(address);
    }

    /// Delay every call to `address` by `delay`
    pub fn slow_down(&self, address: &str, delay: Duration) {
        self.latency.insert(address.to_string(), delay);
    }

    async fn peer(&self, address: &str) -> Result<Arc<Coordinator>> {
        let delay = self.latency.get(address).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.contains(address) {
            return Err(unreachable(address));
        }
        self.peers
            .get(address)
            .and_then(|peer| peer.upgrade())
            .ok_or_else(|| unreachable(address))
    }
}

fn unreachable(address: &str) -> ClientError {
    ApiError::new(
        ErrorCode::PeerUnreachable,
        format!("cannot reach {}", address),
    )
    .into_client_error()
}

#[async_trait]
impl PeerTransport for LocalTransport {
    async fn get(&self, peer: &str, request: GetRequest) -> Result<GetResponse> {
        self.peer(peer).await?
            .get(request)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn set(&self, peer: &str, request: SetRequest) -> Result<SetResponse> {
        self.peer(peer).await?
            .set(request)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn split(&self, peer: &str, request: SplitRequest) -> Result<()> {
        self.peer(peer).await?
            .apply_split(request)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn add_nodes(&self, peer: &str, nodes: Vec<Node>) -> Result<usize> {
        self.peer(peer).await?
            .add_nodes(nodes)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn get_node(&self, peer: &str, location: Location) -> Result<Node> {
        self.peer(peer).await?
            .get_node(location)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn remove_node(&self, peer: &str, location: Location) -> Result<()> {
        self.peer(peer).await?
            .remove_node(location)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn add_child(&self, peer: &str, parent: Location, child: Child) -> Result<Node> {
        self.peer(peer).await?
            .add_child(parent, child)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn remove_children(&self, peer: &str, parent: Location) -> Result<Vec<Location>> {
        self.peer(peer).await?
            .remove_children(parent)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn set_merge_function(&self, peer: &str, request: MergeFunctionRequest) -> Result<()> {
        self.peer(peer).await?
            .set_merge_function(request)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn set_global_merge_function(
        &self,
        peer: &str,
        request: GlobalMergeFunctionRequest,
    ) -> Result<()> {
        self.peer(peer).await?
            .set_global_merge_function(request)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn merkle_tree(&self, peer: &str, root: Location) -> Result<Vec<MerkleEntry>> {
        self.peer(peer).await?
            .merkle_tree(root)
            .map_err(ApiError::into_client_error)
    }

    async fn download(&self, peer: &str, locations: Vec<Location>) -> Result<Vec<Node>> {
        self.peer(peer).await?
            .download(&locations)
            .map_err(ApiError::into_client_error)
    }

    async fn upload(&self, peer: &str, nodes: Vec<Node>) -> Result<UploadResponse> {
        self.peer(peer).await?
            .upload(nodes)
            .await
            .map_err(ApiError::into_client_error)
    }

    async fn resolve_virtual(
        &self,
        peer: &str,
        session_id: SessionId,
        virtual_location: VirtualLocation,
    ) -> Result<Location> {
        self.peer(peer).await?
            .resolve_virtual(session_id, virtual_location)
            .map_err(ApiError::into_client_error)
    }

    async fn end_session(&self, peer: &str, session_id: SessionId) -> Result<()> {
        self.peer(peer).await?
            .end_session(session_id, false)
            .await
            .map_err(ApiError::into_client_error)
    }
}
