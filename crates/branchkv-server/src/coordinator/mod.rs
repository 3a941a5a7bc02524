//! Coordinator
//!
//! Owns the local [`Store`] and [`RangeIndex`] of one server and routes every
//! operation to the shard owning it. Ordinary operations run in the
//! *serving* phase (shared); a range split runs in the exclusive
//! *splitting* phase.
//!
//! Lock discipline: `phase` is only held around local store work, never
//! while waiting on a peer that could be waiting on us. Every local store
//! mutation, including the ones serving peer-internal calls, runs under it,
//! so a split never relocates a node that changes after its snapshot.
//! Split and ResolveVirtual only touch the index or session maps and never
//! take it. `parking_lot` guards are never held across an `.await`.

mod merge;
mod split;

pub use merge::MergeBindings;

use crate::config::ServerConfig;
use crate::error::{ApiError, Result};
use crate::invoker::ActionInvoker;
use branchkv_client::{with_retry, PeerTransport, Result as ClientResult};
use branchkv_core::{
    rpc::*, Child, ChildUpdate, CoreError, Link, Location, Lookup, MerkleEntry, Node, NodeRef,
    RangeIndex, SessionId, Store, VirtualLocation,
};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Where an operation was served
enum Route<T> {
    Local(T),
    Remote(String),
}

/// Per-server coordinator
pub struct Coordinator {
    address: String,
    peers: Vec<String>,
    threshold: usize,
    store: RwLock<Store>,
    index: RwLock<RangeIndex>,
    phase: tokio::sync::RwLock<()>,
    available: Mutex<Vec<String>>,
    bindings: MergeBindings,
    merging: DashSet<Location>,
    transport: Arc<dyn PeerTransport>,
    invoker: Arc<dyn ActionInvoker>,
    retry_attempts: u32,
    retry_backoff: Duration,
    splits: AtomicU64,
    merges: AtomicU64,
    started_at: DateTime<Utc>,
}

impl Coordinator {
    /// Create a coordinator owning an empty store
    ///
    /// The routing table starts with one mapping of the whole key space to
    /// the configured initial server.
    pub fn new(
        config: &ServerConfig,
        transport: Arc<dyn PeerTransport>,
        invoker: Arc<dyn ActionInvoker>,
    ) -> Self {
        let available = config
            .available_servers
            .iter()
            .filter(|s| **s != config.self_address)
            .cloned()
            .collect();

        Self {
            address: config.self_address.clone(),
            peers: config.peers(),
            threshold: config.threshold,
            store: RwLock::new(Store::with_max_chain_depth(config.max_chain_depth)),
            index: RwLock::new(RangeIndex::with_initial(config.initial_server())),
            phase: tokio::sync::RwLock::new(()),
            available: Mutex::new(available),
            bindings: MergeBindings::default(),
            merging: DashSet::new(),
            transport,
            invoker,
            retry_attempts: config.retry_attempts.max(1),
            retry_backoff: config.retry_backoff(),
            splits: AtomicU64::new(0),
            merges: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Address peers use to reach this server
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of live nodes stored here
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    /// Number of live nodes inside this server's own range
    ///
    /// Pulled replicas of foreign nodes do not count towards a split.
    pub fn owned_len(&self) -> usize {
        let range = self.index.read().range_of(&self.address);
        match range {
            Some(range) => self.store.read().count_in(range.low, range.high),
            None => 0,
        }
    }

    /// Whether no node is stored here
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Copy of the routing table
    pub fn index(&self) -> RangeIndex {
        self.index.read().clone()
    }

    /// Merge-function bindings of this server
    pub fn bindings(&self) -> &MergeBindings {
        &self.bindings
    }

    /// Locations stored here
    pub fn locations(&self) -> Vec<Location> {
        self.store.read().iter().map(|n| n.location).collect()
    }

    /// Status snapshot
    pub fn status(&self) -> StatusResponse {
        // One lock at a time, the split planner takes them in store/index order
        let nodes = self.len();
        let range = self.index.read().range_of(&self.address);
        let available_servers = self.available.lock().clone();
        StatusResponse {
            address: self.address.clone(),
            range,
            nodes,
            threshold: self.threshold,
            available_servers,
            splits: self.splits.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            started_at: self.started_at.to_rfc3339(),
        }
    }

    // ==================== Routing ====================

    fn owner_of_hash(&self, hash: u32) -> Result<String> {
        let owner = self.index.read().locate(hash).map(str::to_string);
        owner.map_err(|e| {
            error!(hash, error = %e, "routing table has a gap");
            ApiError::from(e)
        })
    }

    fn owner_of(&self, location: Location) -> Result<String> {
        self.owner_of_hash(location.key_hash())
    }

    fn is_local(&self, address: &str) -> bool {
        address == self.address
    }

    /// Run `local` in the serving phase if this server owns `hash`
    async fn route<T>(&self, hash: u32, local: impl FnOnce(&Self) -> Result<T>) -> Result<Route<T>> {
        let _phase = self.phase.read().await;
        let owner = self.owner_of_hash(hash)?;
        if self.is_local(&owner) {
            local(self).map(Route::Local)
        } else {
            Ok(Route::Remote(owner))
        }
    }

    /// Resolve a node reference, asking peers for unknown virtual handles
    async fn resolve_ref(&self, session_id: SessionId, node_ref: NodeRef) -> Result<Location> {
        let virtual_location = match node_ref {
            NodeRef::Root => return Ok(Location::ROOT),
            NodeRef::Location(location) => return Ok(location),
            NodeRef::Virtual(virtual_location) => virtual_location,
        };

        let known = self.store.read().lookup_virtual(session_id, virtual_location);
        if let Some(location) = known {
            return Ok(location);
        }

        for peer in &self.peers {
            match self
                .transport
                .resolve_virtual(peer, session_id, virtual_location)
                .await
            {
                Ok(location) => return Ok(location),
                Err(e) if e.is_not_found() => {}
                Err(e) => debug!(%peer, error = %e, "virtual lookup failed"),
            }
        }

        Err(CoreError::VirtualLocationNotFound {
            session_id,
            virtual_location,
        }
        .into())
    }

    /// Virtual handle known to this server only
    pub fn resolve_virtual(
        &self,
        session_id: SessionId,
        virtual_location: VirtualLocation,
    ) -> Result<Location> {
        let resolved = self
            .store
            .read()
            .resolve(session_id, NodeRef::Virtual(virtual_location));
        Ok(resolved?)
    }

    /// Drop a session's virtual handles, on every server if `propagate`
    pub async fn end_session(&self, session_id: SessionId, propagate: bool) -> Result<()> {
        let existed = self.store.write().end_session(session_id);
        debug!(session_id, existed, "ended session");

        if propagate {
            let transport = &self.transport;
            self.broadcast("end_session", self.peers.clone(), |peer| async move {
                transport.end_session(&peer, session_id).await
            })
            .await;
        }
        Ok(())
    }

    // ==================== Get ====================

    /// Look up keys, following the dependency chain across shards
    #[instrument(skip(self, request), fields(start = ?request.start()))]
    pub async fn get(&self, request: GetRequest) -> Result<GetResponse> {
        let start = self.resolve_ref(request.session_id, request.start()).await?;

        if start.is_root() {
            let response = GetResponse {
                data: request.resolved.clone(),
                unresolved: request.keys.clone().unwrap_or_default(),
                depth: request.depth,
            };
            return Self::check_resolved(&request, response);
        }

        let routed = self
            .route(start.key_hash(), |this| this.lookup_local(start, &request))
            .await?;

        let lookup = match routed {
            Route::Remote(owner) => {
                debug!(%owner, %start, "forwarding get");
                let mut forwarded = request;
                forwarded.location = Some(start);
                forwarded.virtual_location = None;
                return Ok(self.transport.get(&owner, forwarded).await?);
            }
            Route::Local(None) => {
                return Ok(GetResponse {
                    data: request.resolved,
                    unresolved: request.keys.unwrap_or_default(),
                    depth: request.depth,
                });
            }
            Route::Local(Some(lookup)) => lookup,
        };

        let response = if lookup.is_partial() {
            self.continue_get(&request, lookup).await?
        } else {
            GetResponse {
                data: lookup.data,
                unresolved: lookup.unresolved,
                depth: lookup.depth,
            }
        };
        Self::check_resolved(&request, response)
    }

    /// Walk the local part of a chain; `None` ends a continuation whose
    /// start is gone
    fn lookup_local(&self, start: Location, request: &GetRequest) -> Result<Option<Lookup>> {
        let store = self.store.read();
        match &request.keys {
            None => {
                let node = store.node(start).ok_or(CoreError::LocationNotFound(start))?;
                Ok(Some(Lookup {
                    data: node.data.clone(),
                    depth: request.depth + 1,
                    ..Lookup::default()
                }))
            }
            Some(keys) => {
                match store.walk(start, keys.clone(), request.resolved.clone(), request.depth) {
                    Ok(lookup) => Ok(Some(lookup)),
                    Err(CoreError::LocationNotFound(_)) if request.continuation => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Continue a walk at the owner of the next dependency
    async fn continue_get(&self, request: &GetRequest, lookup: Lookup) -> Result<GetResponse> {
        let Some(next) = lookup.next else {
            return Ok(GetResponse {
                data: lookup.data,
                unresolved: lookup.unresolved,
                depth: lookup.depth,
            });
        };

        let owner = self.owner_of(next)?;
        if self.is_local(&owner) {
            debug!(%next, "dependency missing on its owner, chain ends");
            return Ok(GetResponse {
                data: lookup.data,
                unresolved: lookup.unresolved,
                depth: lookup.depth,
            });
        }

        debug!(%owner, %next, remaining = lookup.unresolved.len(), "continuing get");
        let continuation = GetRequest {
            session_id: request.session_id,
            keys: Some(lookup.unresolved),
            location: Some(next),
            virtual_location: None,
            continuation: true,
            resolved: lookup.data,
            depth: lookup.depth,
        };
        Ok(self.transport.get(&owner, continuation).await?)
    }

    /// Fail a first-hop lookup where none of the requested keys resolved
    fn check_resolved(request: &GetRequest, response: GetResponse) -> Result<GetResponse> {
        let requested = request.keys.as_ref().is_some_and(|k| !k.is_empty());
        if !request.continuation && requested && response.data.is_empty() {
            return Err(CoreError::KeyNotFound(response.unresolved.join(",")).into());
        }
        Ok(response)
    }

    // ==================== Set ====================

    /// Write a node at the shard owning its routing key
    #[instrument(skip(self, request), fields(key = ?request.routing_key()))]
    pub async fn set(&self, request: SetRequest) -> Result<SetResponse> {
        let hash = match request.routing_key() {
            Some(key) => branchkv_core::key_hash(key),
            None => return Err(CoreError::EmptyUpdate.into()),
        };
        let dependency = self
            .resolve_ref(request.session_id, request.dependency_ref())
            .await?;

        let routed = self
            .route(hash, |this| {
                let mut store = this.store.write();
                let insertion = store.set(dependency, request.data.clone())?;
                if let Some(virtual_location) = request.virtual_location {
                    store.bind_virtual(request.session_id, virtual_location, insertion.location);
                }
                Ok(insertion)
            })
            .await?;

        let location = match routed {
            Route::Local(insertion) => {
                if insertion.created {
                    debug!(location = %insertion.location, %dependency, "stored node");
                }
                self.after_link(insertion.link).await?;
                insertion.location
            }
            Route::Remote(owner) => {
                debug!(%owner, "forwarding set");
                let mut forwarded = request;
                forwarded.dependency = Some(dependency);
                forwarded.virtual_dependency = None;
                self.transport.set(&owner, forwarded).await?.location
            }
        };

        // Forwarding does not exempt this server from its own size check
        self.check_overflow().await;
        Ok(SetResponse { location })
    }

    /// Finish linking a child: refresh remote ancestors, resolve conflicts
    async fn after_link(&self, link: Link) -> Result<()> {
        let conflict = link.is_conflict();
        let parent = link.parent;

        if let Some(update) = link.pending {
            self.forward_child_update(update).await?;
        }
        if conflict {
            self.resolve_conflict(parent).await;
        }
        Ok(())
    }

    /// Deliver a digest refresh to the owner of a remote ancestor
    async fn forward_child_update(&self, update: ChildUpdate) -> Result<()> {
        let owner = self.owner_of(update.parent)?;
        if self.is_local(&owner) {
            debug!(parent = %update.parent, "parent missing on its owner, refresh dropped");
            return Ok(());
        }
        debug!(%owner, parent = %update.parent, "forwarding add_child");
        self.transport
            .add_child(&owner, update.parent, update.child)
            .await?;
        Ok(())
    }

    // ==================== Nodes ====================

    /// Store nodes, handing those owned elsewhere on to their owner
    ///
    /// Used by splits and merges. A spare being filled by a split owns no
    /// range yet and keeps everything; a range owner only keeps nodes inside
    /// its range, so a redistribution racing a split still reaches the
    /// node's current owner.
    pub async fn add_nodes(&self, nodes: Vec<Node>) -> Result<usize> {
        let (stored, foreign) = {
            let _phase = self.phase.read().await;
            let (kept, foreign) = self.partition_owned(nodes)?;
            let stored = self.store.write().add_nodes(kept)?;
            (stored, foreign)
        };

        let mut forwarded = 0;
        for (owner, group) in foreign {
            debug!(%owner, nodes = group.len(), "forwarding add_nodes");
            forwarded += self.transport.add_nodes(&owner, group).await?;
        }
        Ok(stored + forwarded)
    }

    /// Split nodes into the ones this server keeps and the ones grouped by
    /// their remote owner
    fn partition_owned(&self, nodes: Vec<Node>) -> Result<(Vec<Node>, HashMap<String, Vec<Node>>)> {
        let index = self.index.read();
        if index.range_of(&self.address).is_none() {
            return Ok((nodes, HashMap::new()));
        }

        let mut kept = Vec::with_capacity(nodes.len());
        let mut foreign: HashMap<String, Vec<Node>> = HashMap::new();
        for node in nodes {
            let owner = index.locate(node.key_hash())?;
            if self.is_local(owner) {
                kept.push(node);
            } else {
                foreign.entry(owner.to_string()).or_default().push(node);
            }
        }
        Ok((kept, foreign))
    }

    /// Fetch a node from its owner
    pub async fn get_node(&self, location: Location) -> Result<Node> {
        let local = self.store.read().node(location).cloned();
        if let Some(node) = local {
            return Ok(node);
        }
        let owner = self.owner_of(location)?;
        if self.is_local(&owner) {
            return Err(CoreError::LocationNotFound(location).into());
        }
        Ok(self.transport.get_node(&owner, location).await?)
    }

    /// Tombstone a node at its owner
    pub async fn remove_node(&self, location: Location) -> Result<()> {
        let removed = {
            let _phase = self.phase.read().await;
            let mut store = self.store.write();
            if store.contains(location) || location.is_root() {
                Some(store.remove_node(location))
            } else {
                None
            }
        };
        match removed {
            Some(result) => {
                result?;
                Ok(())
            }
            None => {
                let owner = self.owner_of(location)?;
                if self.is_local(&owner) {
                    return Err(CoreError::LocationNotFound(location).into());
                }
                Ok(self.transport.remove_node(&owner, location).await?)
            }
        }
    }

    /// Attach or refresh a child entry at the owner of `parent`
    pub async fn add_child(&self, parent: Location, child: Child) -> Result<Node> {
        let linked = {
            let _phase = self.phase.read().await;
            let mut store = self.store.write();
            if store.contains(parent) {
                let link = store.add_child(parent, child.clone())?;
                Some((link, store.get_node(parent)?))
            } else {
                None
            }
        };

        match linked {
            Some((link, node)) => {
                self.after_link(link).await?;
                Ok(node)
            }
            None => {
                let owner = self.owner_of(parent)?;
                if self.is_local(&owner) {
                    return Err(CoreError::LocationNotFound(parent).into());
                }
                Ok(self.transport.add_child(&owner, parent, child).await?)
            }
        }
    }

    /// Detach every child of a local node and tombstone them at their owners
    pub async fn remove_children(&self, parent: Location) -> Result<Vec<Location>> {
        let detached = {
            let _phase = self.phase.read().await;
            let mut store = self.store.write();
            if store.contains(parent) {
                Some(store.remove_children(parent))
            } else {
                None
            }
        };
        let detachment = match detached {
            Some(result) => result?,
            None => {
                let owner = self.owner_of(parent)?;
                if self.is_local(&owner) {
                    return Err(CoreError::LocationNotFound(parent).into());
                }
                return Ok(self.transport.remove_children(&owner, parent).await?);
            }
        };
        for &child in &detachment.removed {
            self.tombstone(child).await?;
        }
        if let Some(update) = detachment.pending {
            self.forward_child_update(update).await?;
        }
        Ok(detachment.removed)
    }

    /// Tombstone at the owner, tolerating nodes already gone
    async fn tombstone(&self, location: Location) -> Result<()> {
        let owner = self.owner_of(location)?;
        if self.is_local(&owner) {
            let removed = self.store.write().remove_node(location);
            return match removed {
                Ok(_) | Err(CoreError::LocationNotFound(_)) => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        let removed = self.transport.remove_node(&owner, location).await;
        match removed {
            Err(e) if !e.is_not_found() => Err(e.into()),
            _ => Ok(()),
        }
    }

    // ==================== Sync ====================

    /// Merkle projection of the local subtree rooted at `root`
    pub fn merkle_tree(&self, root: Location) -> Result<Vec<MerkleEntry>> {
        let entries = self.store.read().merkle_tree(root)?;
        Ok(entries)
    }

    /// Full local subtrees, parents first
    pub fn download(&self, locations: &[Location]) -> Result<Vec<Node>> {
        let nodes = self.store.read().download(locations)?;
        Ok(nodes)
    }

    /// Topmost remote nodes whose payload is missing here
    pub fn compare(&self, entries: &[MerkleEntry]) -> Vec<Location> {
        self.store.read().compare(entries)
    }

    /// Merge uploaded nodes into the local store
    pub async fn upload(&self, nodes: Vec<Node>) -> Result<UploadResponse> {
        let outcome = {
            let _phase = self.phase.read().await;
            self.store.write().upload(nodes)?
        };
        for update in outcome.pending {
            self.forward_child_update(update).await?;
        }
        Ok(UploadResponse {
            inserted: outcome.inserted,
            merged: outcome.merged,
        })
    }

    /// Pull the subtree rooted at `root` from `peer`
    #[instrument(skip(self))]
    pub async fn pull(&self, peer: &str, root: Location) -> Result<SyncResponse> {
        let remote = self.transport.merkle_tree(peer, root).await?;
        let outdated = self.compare(&remote);
        if outdated.is_empty() {
            debug!(%peer, %root, "replica up to date");
            return Ok(SyncResponse::default());
        }

        let nodes = self.transport.download(peer, outdated.clone()).await?;
        let uploaded = self.upload(nodes).await?;
        info!(
            %peer,
            %root,
            outdated = outdated.len(),
            inserted = uploaded.inserted,
            merged = uploaded.merged,
            "pulled subtree"
        );
        Ok(SyncResponse {
            outdated: outdated.len(),
            inserted: uploaded.inserted,
            merged: uploaded.merged,
        })
    }

    // ==================== Broadcast ====================

    /// Call every target concurrently with bounded retry
    ///
    /// Returns the number of targets that could not be reached.
    pub(crate) async fn broadcast<F, Fut>(&self, operation: &str, targets: Vec<String>, call: F) -> usize
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = ClientResult<()>>,
    {
        let call = &call;
        let attempts = self.retry_attempts;
        let backoff = self.retry_backoff;

        let results = join_all(targets.into_iter().map(|peer| async move {
            let result = with_retry(attempts, backoff, || call(peer.clone())).await;
            (peer, result)
        }))
        .await;

        let mut failures = 0;
        for (peer, result) in results {
            if let Err(e) = result {
                failures += 1;
                error!(operation, %peer, error = %e, "broadcast failed");
            }
        }
        failures
    }
}
