//! Peer transport
//!
//! Servers talk to each other through [`PeerTransport`]. The HTTP
//! implementation keeps one pooled client for its whole lifetime instead of
//! dialing per call.

use crate::{BranchClient, Config, Result};
use async_trait::async_trait;
use branchkv_core::{
    rpc::*, Child, Location, MerkleEntry, Node, SessionId, VirtualLocation,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Request/response channel to other servers, keyed by server address
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Forward a Get
    async fn get(&self, peer: &str, request: GetRequest) -> Result<GetResponse>;

    /// Forward a Set
    async fn set(&self, peer: &str, request: SetRequest) -> Result<SetResponse>;

    /// Deliver a routing-table split
    async fn split(&self, peer: &str, request: SplitRequest) -> Result<()>;

    /// Store nodes verbatim
    async fn add_nodes(&self, peer: &str, nodes: Vec<Node>) -> Result<usize>;

    /// Fetch one node
    async fn get_node(&self, peer: &str, location: Location) -> Result<Node>;

    /// Tombstone one node
    async fn remove_node(&self, peer: &str, location: Location) -> Result<()>;

    /// Attach or refresh a child entry
    async fn add_child(&self, peer: &str, parent: Location, child: Child) -> Result<Node>;

    /// Detach every child of a node
    async fn remove_children(&self, peer: &str, parent: Location) -> Result<Vec<Location>>;

    /// Bind a merge function
    async fn set_merge_function(&self, peer: &str, request: MergeFunctionRequest) -> Result<()>;

    /// Bind the fallback merge function
    async fn set_global_merge_function(
        &self,
        peer: &str,
        request: GlobalMergeFunctionRequest,
    ) -> Result<()>;

    /// Merkle projection of a subtree
    async fn merkle_tree(&self, peer: &str, root: Location) -> Result<Vec<MerkleEntry>>;

    /// Full nodes of subtrees
    async fn download(&self, peer: &str, locations: Vec<Location>) -> Result<Vec<Node>>;

    /// Upload nodes, parents first
    async fn upload(&self, peer: &str, nodes: Vec<Node>) -> Result<UploadResponse>;

    /// Real location behind a virtual handle known to `peer`
    async fn resolve_virtual(
        &self,
        peer: &str,
        session_id: SessionId,
        virtual_location: VirtualLocation,
    ) -> Result<Location>;

    /// Drop a session at `peer`
    async fn end_session(&self, peer: &str, session_id: SessionId) -> Result<()>;
}

/// HTTP/JSON transport sharing one connection pool across all peers
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: BranchClient,
}

impl HttpTransport {
    /// Create a transport with the given client configuration
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            client: BranchClient::new(config)?,
        })
    }

    fn peer(&self, address: &str) -> BranchClient {
        self.client.at(address)
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn get(&self, peer: &str, request: GetRequest) -> Result<GetResponse> {
        self.peer(peer).get_raw(&request).await
    }

    async fn set(&self, peer: &str, request: SetRequest) -> Result<SetResponse> {
        self.peer(peer).set_raw(&request).await
    }

    async fn split(&self, peer: &str, request: SplitRequest) -> Result<()> {
        self.peer(peer).split(&request).await
    }

    async fn add_nodes(&self, peer: &str, nodes: Vec<Node>) -> Result<usize> {
        self.peer(peer).add_nodes(nodes).await
    }

    async fn get_node(&self, peer: &str, location: Location) -> Result<Node> {
        self.peer(peer).get_node(location).await
    }

    async fn remove_node(&self, peer: &str, location: Location) -> Result<()> {
        self.peer(peer).remove_node(location).await
    }

    async fn add_child(&self, peer: &str, parent: Location, child: Child) -> Result<Node> {
        self.peer(peer).add_child(parent, child).await
    }

    async fn remove_children(&self, peer: &str, parent: Location) -> Result<Vec<Location>> {
        self.peer(peer).remove_children(parent).await
    }

    async fn set_merge_function(&self, peer: &str, request: MergeFunctionRequest) -> Result<()> {
        self.peer(peer).set_merge_function(&request).await
    }

    async fn set_global_merge_function(
        &self,
        peer: &str,
        request: GlobalMergeFunctionRequest,
    ) -> Result<()> {
        self.peer(peer).set_global_merge_function(&request).await
    }

    async fn merkle_tree(&self, peer: &str, root: Location) -> Result<Vec<MerkleEntry>> {
        self.peer(peer).merkle_tree(root).await
    }

    async fn download(&self, peer: &str, locations: Vec<Location>) -> Result<Vec<Node>> {
        self.peer(peer).download(locations).await
    }

    async fn upload(&self, peer: &str, nodes: Vec<Node>) -> Result<UploadResponse> {
        self.peer(peer).upload(nodes).await
    }

    async fn resolve_virtual(
        &self,
        peer: &str,
        session_id: SessionId,
        virtual_location: VirtualLocation,
    ) -> Result<Location> {
        self.peer(peer)
            .resolve_virtual(session_id, virtual_location)
            .await
    }

    async fn end_session(&self, peer: &str, session_id: SessionId) -> Result<()> {
        self.peer(peer).end_session(session_id, false).await
    }
}

/// Retry `call` while the peer is unreachable
///
/// Makes at most `attempts` calls and doubles `backoff` after every failure.
/// Errors reported by a reachable peer are returned at once.
pub async fn with_retry<T, F, Fut>(attempts: u32, backoff: Duration, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = backoff;
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_unreachable() && attempt < attempts => {
                warn!(attempt, error = %e, "peer call failed, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unreachable() -> ClientError {
        ClientError::Api {
            status: 502,
            code: crate::error::PEER_UNREACHABLE.to_string(),
            message: "down".to_string(),
            request_id: None,
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_retry_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(3, Duration::ZERO, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unreachable())
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_retry_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(2, Duration::ZERO, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(unreachable())
        })
        .await;
        assert!(result.unwrap_err().is_unreachable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_api_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(5, Duration::ZERO, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::from_body(r#"{"code":"KeyNotFound","message":"x"}"#, 404))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
