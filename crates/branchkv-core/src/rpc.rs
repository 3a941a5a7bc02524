//! Request and response bodies of the peer RPC surface
//!
//! Both the server handlers and the client speak these types as JSON.

use crate::hash::Location;
use crate::index::{KeyRange, Mapping};
use crate::node::{Child, MerkleEntry, Node, NodeRef, SessionId, VirtualLocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==================== Key/value ====================

/// Get request
///
/// `keys == None` returns the full mapping stored at the starting node.
/// A continuation carries the values resolved by earlier hops.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    #[serde(default)]
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_location: Option<VirtualLocation>,
    /// Set on hops that continue a walk started elsewhere
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continuation: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resolved: BTreeMap<String, String>,
    #[serde(default)]
    pub depth: usize,
}

impl GetRequest {
    /// Look up `keys` starting at `start`
    pub fn new(start: NodeRef, keys: Option<Vec<String>>) -> Self {
        let (location, virtual_location) = start.into_parts();
        Self {
            keys,
            location,
            virtual_location,
            ..Self::default()
        }
    }

    /// Set the session owning virtual handles
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    /// Starting node of the lookup
    pub fn start(&self) -> NodeRef {
        NodeRef::from_parts(self.location, self.virtual_location)
    }
}

/// Get response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub data: BTreeMap<String, String>,
    /// Requested keys that no node along the chain defines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
    #[serde(default)]
    pub depth: usize,
}

/// Set request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRequest {
    #[serde(default)]
    pub session_id: SessionId,
    pub data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_location: Option<VirtualLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_dependency: Option<VirtualLocation>,
}

impl SetRequest {
    /// Write `data` on top of `dependency`
    pub fn new(dependency: NodeRef, data: BTreeMap<String, String>) -> Self {
        let (dependency, virtual_dependency) = dependency.into_parts();
        Self {
            data,
            dependency,
            virtual_dependency,
            ..Self::default()
        }
    }

    /// Bind the new node to a virtual handle of `session_id`
    pub fn with_virtual(mut self, session_id: SessionId, virtual_location: VirtualLocation) -> Self {
        self.session_id = session_id;
        self.virtual_location = Some(virtual_location);
        self
    }

    /// Set the session owning virtual handles
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    /// Node this update builds on
    pub fn dependency_ref(&self) -> NodeRef {
        NodeRef::from_parts(self.dependency, self.virtual_dependency)
    }

    /// Smallest key of the payload, which decides the owning shard
    pub fn routing_key(&self) -> Option<&str> {
        self.data.keys().next().map(String::as_str)
    }
}

/// Set response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResponse {
    pub location: Location,
}

// ==================== Cluster ====================

/// Routing-table update replacing one range by two halves
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRequest {
    pub range_low: u32,
    pub range_high: u32,
    pub mid: u32,
    pub left_server: String,
    pub right_server: String,
    /// Whether the receiver must forward the update to every other server
    #[serde(default)]
    pub propagate: bool,
}

impl SplitRequest {
    /// Split `range` at `mid`
    pub fn new(range: KeyRange, mid: u32, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            range_low: range.low,
            range_high: range.high,
            mid,
            left_server: left.into(),
            right_server: right.into(),
            propagate: false,
        }
    }

    /// The range being replaced
    pub fn range(&self) -> KeyRange {
        KeyRange {
            low: self.range_low,
            high: self.range_high,
        }
    }
}

/// Snapshot of the routing table
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    pub mappings: Vec<Mapping>,
}

/// Server status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub address: String,
    pub range: Option<KeyRange>,
    pub nodes: usize,
    pub threshold: usize,
    pub available_servers: Vec<String>,
    pub splits: u64,
    pub merges: u64,
    /// RFC 3339 start time of the server process
    #[serde(default)]
    pub started_at: String,
}

// ==================== Nodes ====================

/// Bulk insert of nodes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddNodesRequest {
    pub nodes: Vec<Node>,
}

/// Number of nodes stored by an AddNodes or Upload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddNodesResponse {
    pub stored: usize,
}

/// Attach or refresh a child entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddChildRequest {
    pub child: Child,
}

/// Children detached from a node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveChildrenResponse {
    pub removed: Vec<Location>,
}

// ==================== Merge functions ====================

/// Bind a merge function to a location or a key
///
/// An empty `name` removes the binding. Key bindings are broadcast to every
/// server unless `propagate` is false.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeFunctionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub name: String,
    #[serde(default = "default_propagate")]
    pub propagate: bool,
}

impl MergeFunctionRequest {
    /// Bind `name` to every conflict whose parent holds `key`
    pub fn for_key(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            location: None,
            key: Some(key.into()),
            name: name.into(),
            propagate: true,
        }
    }

    /// Bind `name` to conflicts below `location`
    pub fn for_location(location: Location, name: impl Into<String>) -> Self {
        Self {
            location: Some(location),
            key: None,
            name: name.into(),
            propagate: true,
        }
    }
}

/// Bind the fallback merge function
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalMergeFunctionRequest {
    pub name: String,
    #[serde(default = "default_propagate")]
    pub propagate: bool,
}

impl GlobalMergeFunctionRequest {
    /// Bind `name` on every server
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            propagate: true,
        }
    }
}

fn default_propagate() -> bool {
    true
}

/// Candidate returned by a merge action
///
/// The candidate becomes a new child of the conflicting parent; its location
/// is derived from its content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<Child>,
}

/// Output of a merge action, either a bare array or `{"nodes": [...]}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MergeOutput {
    List(Vec<MergeCandidate>),
    Wrapped {
        #[serde(alias = "Nodes")]
        nodes: Vec<MergeCandidate>,
    },
}

impl MergeOutput {
    /// The candidates regardless of the envelope
    pub fn into_candidates(self) -> Vec<MergeCandidate> {
        match self {
            Self::List(nodes) | Self::Wrapped { nodes } => nodes,
        }
    }
}

// ==================== Sync ====================

/// Locations whose subtrees should be downloaded
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub locations: Vec<Location>,
}

/// Nodes to upload, parents first
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub nodes: Vec<Node>,
}

/// Outcome of an upload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub inserted: usize,
    pub merged: usize,
}

/// Remote Merkle projection to compare
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareRequest {
    pub entries: Vec<MerkleEntry>,
}

/// Topmost remote nodes missing locally
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareResponse {
    pub outdated: Vec<Location>,
}

/// Pull a peer's subtree into this server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub peer: String,
    #[serde(default)]
    pub root: Location,
}

/// Outcome of a pull
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub outdated: usize,
    pub inserted: usize,
    pub merged: usize,
}

// ==================== Sessions ====================

/// Real location behind a virtual handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveVirtualResponse {
    pub location: Location,
}

/// Query of broadcastable deletes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagateQuery {
    #[serde(default = "default_propagate")]
    pub propagate: bool,
}

impl Default for PropagateQuery {
    fn default() -> Self {
        Self { propagate: true }
    }
}

// ==================== Errors ====================

/// JSON error body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}
