//! Main client implementation

use crate::{config::endpoint_for, ClientError, Config, Result};
use branchkv_core::{
    rpc::*, Child, Location, MerkleEntry, Node, NodeRef, RangeIndex, SessionId, VirtualLocation,
};
use reqwest::{header, Client, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Client for one branchkv server
///
/// Cloning is cheap and clones share the connection pool.
#[derive(Clone, Debug)]
pub struct BranchClient {
    config: Config,
    http: Client,
}

impl BranchClient {
    /// Create a new client with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let user_agent = config
            .user_agent
            .parse()
            .map_err(|_| ClientError::Config(format!("invalid user agent: {}", config.user_agent)))?;
        headers.insert(header::USER_AGENT, user_agent);

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self { config, http })
    }

    /// Create with endpoint URL or bare server address
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        Self::new(Config::new(endpoint))
    }

    /// Client for another server sharing this client's connection pool
    pub fn at(&self, address: &str) -> Self {
        Self {
            config: Config {
                endpoint: endpoint_for(address),
                ..self.config.clone()
            },
            http: self.http.clone(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Key/Value Operations ====================

    /// Look up `keys` starting at `start`, or the full mapping if `keys` is `None`
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        session_id: SessionId,
        start: NodeRef,
        keys: Option<Vec<String>>,
    ) -> Result<BTreeMap<String, String>> {
        let request = GetRequest::new(start, keys).with_session(session_id);
        Ok(self.get_raw(&request).await?.data)
    }

    /// Look up a single key
    #[instrument(skip(self))]
    pub async fn get_key(&self, start: NodeRef, key: &str) -> Result<Option<String>> {
        let mut data = self.get(0, start, Some(vec![key.to_string()])).await?;
        Ok(data.remove(key))
    }

    /// Send a Get request as is
    #[instrument(skip(self, request), fields(location = ?request.location))]
    pub async fn get_raw(&self, request: &GetRequest) -> Result<GetResponse> {
        self.post_json("/kv/get", request).await
    }

    /// Write `data` on top of `dependency`, returns the new location
    #[instrument(skip(self, data))]
    pub async fn set(
        &self,
        dependency: NodeRef,
        data: BTreeMap<String, String>,
    ) -> Result<Location> {
        let request = SetRequest::new(dependency, data);
        Ok(self.set_raw(&request).await?.location)
    }

    /// Send a Set request as is
    #[instrument(skip(self, request), fields(dependency = ?request.dependency))]
    pub async fn set_raw(&self, request: &SetRequest) -> Result<SetResponse> {
        self.post_json("/kv/set", request).await
    }

    // ==================== Cluster Operations ====================

    /// Apply a routing-table split
    #[instrument(skip(self))]
    pub async fn split(&self, request: &SplitRequest) -> Result<()> {
        self.send(Method::POST, "/cluster/split", Some(request)).await?;
        Ok(())
    }

    /// Fetch the server's routing table
    #[instrument(skip(self))]
    pub async fn index(&self) -> Result<RangeIndex> {
        let response: IndexResponse = self.get_json("/cluster/index").await?;
        let mut index = RangeIndex::new();
        for mapping in response.mappings {
            index
                .add_mapping(mapping.range, mapping.address)
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        }
        Ok(index)
    }

    /// Fetch the server status
    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<StatusResponse> {
        self.get_json("/status").await
    }

    /// Check liveness
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<()> {
        self.send::<()>(Method::GET, "/health", None).await?;
        Ok(())
    }

    // ==================== Node Operations ====================

    /// Store nodes verbatim
    #[instrument(skip(self, nodes), fields(count = nodes.len()))]
    pub async fn add_nodes(&self, nodes: Vec<Node>) -> Result<usize> {
        let response: AddNodesResponse = self
            .post_json("/nodes", &AddNodesRequest { nodes })
            .await?;
        Ok(response.stored)
    }

    /// Fetch one node
    #[instrument(skip(self))]
    pub async fn get_node(&self, location: Location) -> Result<Node> {
        self.get_json(&format!("/nodes/{}", location.as_u64())).await
    }

    /// Tombstone one node
    #[instrument(skip(self))]
    pub async fn remove_node(&self, location: Location) -> Result<()> {
        self.send::<()>(Method::DELETE, &format!("/nodes/{}", location.as_u64()), None)
            .await?;
        Ok(())
    }

    /// Attach or refresh a child entry, returns the updated parent
    #[instrument(skip(self, child), fields(child = %child.location))]
    pub async fn add_child(&self, parent: Location, child: Child) -> Result<Node> {
        self.post_json(
            &format!("/nodes/{}/children", parent.as_u64()),
            &AddChildRequest { child },
        )
        .await
    }

    /// Detach every child of `parent`
    #[instrument(skip(self))]
    pub async fn remove_children(&self, parent: Location) -> Result<Vec<Location>> {
        let response = self
            .send::<()>(
                Method::DELETE,
                &format!("/nodes/{}/children", parent.as_u64()),
                None,
            )
            .await?;
        let body: RemoveChildrenResponse = response.json().await?;
        Ok(body.removed)
    }

    // ==================== Merge Functions ====================

    /// Bind a merge function to a location or a key
    #[instrument(skip(self))]
    pub async fn set_merge_function(&self, request: &MergeFunctionRequest) -> Result<()> {
        self.send(Method::POST, "/merge-functions", Some(request)).await?;
        Ok(())
    }

    /// Bind the fallback merge function
    #[instrument(skip(self))]
    pub async fn set_global_merge_function(
        &self,
        request: &GlobalMergeFunctionRequest,
    ) -> Result<()> {
        self.send(Method::POST, "/merge-functions/global", Some(request))
            .await?;
        Ok(())
    }

    // ==================== Sync Operations ====================

    /// Merkle projection of the subtree rooted at `root`
    #[instrument(skip(self))]
    pub async fn merkle_tree(&self, root: Location) -> Result<Vec<MerkleEntry>> {
        self.get_json(&format!("/merkle/{}", root.as_u64())).await
    }

    /// Full nodes of the subtrees rooted at `locations`
    #[instrument(skip(self))]
    pub async fn download(&self, locations: Vec<Location>) -> Result<Vec<Node>> {
        self.post_json("/sync/download", &DownloadRequest { locations })
            .await
    }

    /// Upload nodes, parents first
    #[instrument(skip(self, nodes), fields(count = nodes.len()))]
    pub async fn upload(&self, nodes: Vec<Node>) -> Result<UploadResponse> {
        self.post_json("/sync/upload", &UploadRequest { nodes }).await
    }

    /// Compare a Merkle projection against the server's store
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn compare(&self, entries: Vec<MerkleEntry>) -> Result<Vec<Location>> {
        let response: CompareResponse = self
            .post_json("/sync/compare", &CompareRequest { entries })
            .await?;
        Ok(response.outdated)
    }

    /// Ask the server to pull `root` from `peer`
    #[instrument(skip(self))]
    pub async fn pull(&self, peer: &str, root: Location) -> Result<SyncResponse> {
        self.post_json(
            "/sync/pull",
            &SyncRequest {
                peer: peer.to_string(),
                root,
            },
        )
        .await
    }

    // ==================== Sessions ====================

    /// Real location behind a virtual handle
    #[instrument(skip(self))]
    pub async fn resolve_virtual(
        &self,
        session_id: SessionId,
        virtual_location: VirtualLocation,
    ) -> Result<Location> {
        let response: ResolveVirtualResponse = self
            .get_json(&format!("/sessions/{}/virtual/{}", session_id, virtual_location))
            .await?;
        Ok(response.location)
    }

    /// Drop a session's virtual handles
    #[instrument(skip(self))]
    pub async fn end_session(&self, session_id: SessionId, propagate: bool) -> Result<()> {
        let path = format!("/sessions/{}?propagate={}", session_id, propagate);
        self.send::<()>(Method::DELETE, &path, None).await?;
        Ok(())
    }

    // ==================== Helper Methods ====================

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        Ok(response.json().await?)
    }

    async fn send<B: Serialize>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Response> {
        let url = format!("{}{}", self.config.endpoint, path);
        debug!("Sending {} request to {}", method, url);

        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::from_body(&text, status.as_u16()));
        }

        Ok(response)
    }
}
