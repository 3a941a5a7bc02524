//! Conflict resolution through merge functions
//!
//! A parent that gains a second child has diverged. The owner of the parent
//! invokes the bound merge action with the parent node and replaces the
//! merged children by the candidates the action returns.

use super::Coordinator;
use crate::error::{ApiError, ErrorCode, Result};
use branchkv_core::{
    rpc::{GlobalMergeFunctionRequest, MergeFunctionRequest, MergeOutput},
    Location, Node,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// Merge-function bindings, looked up by parent location, then by key,
/// then the global fallback
#[derive(Debug, Default)]
pub struct MergeBindings {
    by_location: DashMap<Location, String>,
    by_key: DashMap<String, String>,
    global: RwLock<Option<String>>,
}

impl MergeBindings {
    /// Bind or, with an empty name, unbind a location
    pub fn bind_location(&self, location: Location, name: &str) {
        if name.is_empty() {
            self.by_location.remove(&location);
        } else {
            self.by_location.insert(location, name.to_string());
        }
    }

    /// Bind or, with an empty name, unbind a key
    pub fn bind_key(&self, key: &str, name: &str) {
        if name.is_empty() {
            self.by_key.remove(key);
        } else {
            self.by_key.insert(key.to_string(), name.to_string());
        }
    }

    /// Set or, with an empty name, clear the fallback
    pub fn bind_global(&self, name: &str) {
        *self.global.write() = (!name.is_empty()).then(|| name.to_string());
    }

    /// Merge function responsible for a conflict under `parent`
    pub fn lookup(&self, parent: &Node) -> Option<String> {
        if let Some(name) = self.by_location.get(&parent.location) {
            return Some(name.clone());
        }
        let by_key = parent
            .data
            .keys()
            .find_map(|key| self.by_key.get(key).map(|name| name.clone()));
        by_key.or_else(|| self.global.read().clone())
    }

    /// Remove the location bindings of relocated nodes
    pub fn take_locations(&self, locations: &[Location]) -> Vec<(Location, String)> {
        locations
            .iter()
            .filter_map(|location| self.by_location.remove(location))
            .collect()
    }
}

impl Coordinator {
    /// Resolve a conflict under `parent`, at most one cycle at a time
    ///
    /// Failures are logged; the write that revealed the conflict succeeded.
    pub(crate) async fn resolve_conflict(&self, parent: Location) {
        if !self.merging.insert(parent) {
            debug!(%parent, "merge already running");
            return;
        }
        let result = self.run_merge(parent).await;
        self.merging.remove(&parent);

        match result {
            Ok(Some(candidates)) => info!(%parent, candidates, "resolved conflict"),
            Ok(None) => {}
            Err(e) => warn!(
                %parent,
                code = ErrorCode::ConflictResolutionFailure.as_str(),
                error = %e,
                "conflict resolution failed"
            ),
        }
    }

    /// One merge cycle; `None` when there is nothing to merge
    async fn run_merge(&self, parent: Location) -> Result<Option<usize>> {
        let snapshot = self.store.read().node(parent).cloned();
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };
        if snapshot.children.len() < 2 {
            return Ok(None);
        }
        let Some(name) = self.bindings.lookup(&snapshot) else {
            debug!(%parent, "no merge function bound");
            return Ok(None);
        };

        let payload = serde_json::to_value(&snapshot).map_err(|e| ApiError::Internal(e.to_string()))?;
        let output = self
            .invoker
            .invoke(&name, payload)
            .await
            .map_err(|e| ApiError::new(ErrorCode::ConflictResolutionFailure, e.to_string()))?;
        let candidates = serde_json::from_value::<MergeOutput>(output)
            .map_err(|e| {
                ApiError::new(
                    ErrorCode::ConflictResolutionFailure,
                    format!("malformed output of {}: {}", name, e),
                )
            })?
            .into_candidates();
        if candidates.is_empty() {
            return Err(ApiError::new(
                ErrorCode::ConflictResolutionFailure,
                format!("{} returned no nodes", name),
            ));
        }

        let mut nodes = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut node = Node::new(parent, candidate.data)?;
            node.children = candidate.children;
            node.normalize_children();
            node.refresh_digest();
            nodes.push(node);
        }

        // Children attached while the action ran stay in place
        let merged: Vec<Location> = snapshot.children.iter().map(|c| c.location).collect();
        let detachment = self.store.write().detach_children(parent, &merged)?;

        let kept: HashSet<Location> = nodes.iter().map(|n| n.location).collect();
        for &child in merged.iter().filter(|c| !kept.contains(c)) {
            self.tombstone(child).await?;
        }

        let mut by_owner: HashMap<String, Vec<Node>> = HashMap::new();
        for node in &nodes {
            by_owner
                .entry(self.owner_of(node.location)?)
                .or_default()
                .push(node.clone());
        }
        for (owner, group) in by_owner {
            if self.is_local(&owner) {
                self.add_nodes(group).await?;
            } else {
                self.transport.add_nodes(&owner, group).await?;
            }
        }

        let mut pending = detachment.pending;
        for node in &nodes {
            let link = self.store.write().add_child(parent, node.as_child())?;
            if link.pending.is_some() {
                pending = link.pending;
            }
        }
        if let Some(update) = pending {
            self.forward_child_update(update).await?;
        }

        self.merges.fetch_add(1, Ordering::Relaxed);
        Ok(Some(nodes.len()))
    }

    /// Bind a merge function to a location (at its owner) or a key (everywhere)
    pub async fn set_merge_function(&self, request: MergeFunctionRequest) -> Result<()> {
        match (request.location, request.key.clone()) {
            (Some(location), _) => {
                let owner = self.owner_of(location)?;
                if !self.is_local(&owner) {
                    debug!(%owner, %location, "forwarding merge binding");
                    self.transport.set_merge_function(&owner, request).await?;
                    return Ok(());
                }
                self.bindings.bind_location(location, &request.name);
                info!(%location, name = %request.name, "bound merge function");
            }
            (None, Some(key)) => {
                self.bindings.bind_key(&key, &request.name);
                info!(%key, name = %request.name, "bound merge function");

                if request.propagate {
                    let forwarded = MergeFunctionRequest {
                        propagate: false,
                        ..request.clone()
                    };
                    let transport = &self.transport;
                    let forwarded = &forwarded;
                    self.broadcast("set_merge_function", self.peers.clone(), |peer| async move {
                        transport.set_merge_function(&peer, forwarded.clone()).await
                    })
                    .await;
                }
            }
            (None, None) => {
                return Err(ApiError::invalid("merge function needs a location or a key"));
            }
        }
        Ok(())
    }

    /// Bind the fallback merge function on every server
    pub async fn set_global_merge_function(&self, request: GlobalMergeFunctionRequest) -> Result<()> {
        self.bindings.bind_global(&request.name);
        info!(name = %request.name, "bound global merge function");

        if request.propagate {
            let forwarded = GlobalMergeFunctionRequest {
                propagate: false,
                ..request
            };
            let transport = &self.transport;
            let forwarded = &forwarded;
            self.broadcast("set_global_merge_function", self.peers.clone(), |peer| async move {
                transport
                    .set_global_merge_function(&peer, forwarded.clone())
                    .await
            })
            .await;
        }
        Ok(())
    }
}
