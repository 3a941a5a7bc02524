//! Versioned node store
//!
//! An append-only arena of [`Node`]s addressed by content-derived
//! [`Location`]s. Slot 0 always holds the local root sentinel. Removed nodes
//! leave a tombstone in their slot so a later re-insert revives it.

use crate::error::{CoreError, Result};
use crate::hash::Location;
use crate::node::{Child, ChildUpdate, Node, NodeRef, SessionId, VirtualLocation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Default bound on walks toward the root
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 65_536;

/// Result of walking a dependency chain
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    /// Resolved values, nearest ancestor wins
    pub data: BTreeMap<String, String>,
    /// Requested keys not resolved yet
    #[serde(default)]
    pub unresolved: Vec<String>,
    /// Dependency stored on another shard where the walk must continue
    #[serde(default)]
    pub next: Option<Location>,
    /// Number of nodes visited so far, including earlier hops
    #[serde(default)]
    pub depth: usize,
}

impl Lookup {
    /// Whether the walk still has to continue elsewhere
    pub fn is_partial(&self) -> bool {
        self.next.is_some() && !self.unresolved.is_empty()
    }
}

/// Result of attaching a child to its parent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    /// Parent the child was attached to
    pub parent: Location,
    /// Whether the child entry is new (not a digest refresh)
    pub attached: bool,
    /// Number of children of the parent afterwards, 0 if the parent is remote
    pub siblings: usize,
    /// Digest refresh to apply at the owner of a remote ancestor
    pub pending: Option<ChildUpdate>,
}

impl Link {
    fn deferred(parent: Location, child: Child) -> Self {
        Self {
            parent,
            attached: false,
            siblings: 0,
            pending: Some(ChildUpdate { parent, child }),
        }
    }

    /// Whether a new child made a non-root parent diverge
    pub fn is_conflict(&self) -> bool {
        self.attached && self.siblings > 1 && !self.parent.is_root()
    }
}

/// Result of a Set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Insertion {
    /// Location of the new node
    pub location: Location,
    /// Whether a node was created; false for an idempotent repeat
    pub created: bool,
    /// How the node was linked into its parent
    pub link: Link,
}

/// Result of detaching every child of a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detachment {
    /// Children that were detached
    pub removed: Vec<Location>,
    /// Digest refresh to apply at the owner of a remote ancestor
    pub pending: Option<ChildUpdate>,
}

/// Content-addressed, Merkle-hashed version DAG
#[derive(Debug)]
pub struct Store {
    nodes: Vec<Option<Node>>,
    slots: HashMap<Location, usize>,
    virtuals: HashMap<SessionId, HashMap<VirtualLocation, Location>>,
    live: usize,
    max_chain_depth: usize,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create a store holding only the root sentinel
    pub fn new() -> Self {
        Self::with_max_chain_depth(DEFAULT_MAX_CHAIN_DEPTH)
    }

    /// Create a store with a custom walk bound
    pub fn with_max_chain_depth(max_chain_depth: usize) -> Self {
        let mut slots = HashMap::new();
        slots.insert(Location::ROOT, 0);
        Self {
            nodes: vec![Some(Node::root())],
            slots,
            virtuals: HashMap::new(),
            live: 0,
            max_chain_depth: max_chain_depth.max(1),
        }
    }

    /// Number of live nodes, the root excluded
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether only the root is stored
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Configured walk bound
    pub fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    /// Whether a live node is stored at `location`
    pub fn contains(&self, location: Location) -> bool {
        self.node(location).is_some()
    }

    /// Borrow a live node
    pub fn node(&self, location: Location) -> Option<&Node> {
        self.slots
            .get(&location)
            .and_then(|&slot| self.nodes[slot].as_ref())
    }

    pub(crate) fn node_mut(&mut self, location: Location) -> Option<&mut Node> {
        match self.slots.get(&location) {
            Some(&slot) => self.nodes[slot].as_mut(),
            None => None,
        }
    }

    /// Clone a live node
    pub fn get_node(&self, location: Location) -> Result<Node> {
        self.node(location)
            .cloned()
            .ok_or(CoreError::LocationNotFound(location))
    }

    /// The local root sentinel
    pub fn root(&self) -> &Node {
        // Slot 0 is never tombstoned
        match self.nodes.first().and_then(Option::as_ref) {
            Some(root) => root,
            None => unreachable!("root slot is never cleared"),
        }
    }

    /// Iterate over live nodes, the root excluded
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().skip(1).filter_map(Option::as_ref)
    }

    /// Locations of live nodes whose key hash is within `[low, high]`
    pub fn locations_in(&self, low: u32, high: u32) -> Vec<Location> {
        self.iter()
            .filter(|n| (low..=high).contains(&n.key_hash()))
            .map(|n| n.location)
            .collect()
    }

    /// Number of live nodes whose key hash falls in `low..=high`
    pub fn count_in(&self, low: u32, high: u32) -> usize {
        self.iter()
            .filter(|n| (low..=high).contains(&n.key_hash()))
            .count()
    }

    // ==================== Sessions ====================

    /// Record a virtual handle for a session
    pub fn bind_virtual(
        &mut self,
        session_id: SessionId,
        virtual_location: VirtualLocation,
        location: Location,
    ) {
        self.virtuals
            .entry(session_id)
            .or_default()
            .insert(virtual_location, location);
    }

    /// Look up a virtual handle without failing
    pub fn lookup_virtual(
        &self,
        session_id: SessionId,
        virtual_location: VirtualLocation,
    ) -> Option<Location> {
        self.virtuals
            .get(&session_id)
            .and_then(|m| m.get(&virtual_location))
            .copied()
    }

    /// Resolve a reference to a real location
    pub fn resolve(&self, session_id: SessionId, node_ref: NodeRef) -> Result<Location> {
        match node_ref {
            NodeRef::Root => Ok(Location::ROOT),
            NodeRef::Location(location) => Ok(location),
            NodeRef::Virtual(virtual_location) => self
                .lookup_virtual(session_id, virtual_location)
                .ok_or(CoreError::VirtualLocationNotFound {
                    session_id,
                    virtual_location,
                }),
        }
    }

    /// Drop every virtual handle of a session, returns true if it existed
    pub fn end_session(&mut self, session_id: SessionId) -> bool {
        self.virtuals.remove(&session_id).is_some()
    }

    // ==================== Get ====================

    /// Look up keys starting at `start`
    ///
    /// With `keys == None` the full mapping of the starting node is returned.
    /// Otherwise the chain is walked toward the root and each key takes the
    /// first value found. Unresolved keys are omitted; the lookup fails with
    /// `KeyNotFound` only when none of the requested keys resolved.
    pub fn get(&self, start: Location, keys: Option<&[String]>) -> Result<Lookup> {
        let lookup = match keys {
            None => {
                let node = self.node(start).ok_or(CoreError::LocationNotFound(start))?;
                Lookup {
                    data: node.data.clone(),
                    depth: 1,
                    ..Lookup::default()
                }
            }
            Some(keys) => self.walk(start, keys.to_vec(), BTreeMap::new(), 0)?,
        };

        if lookup.next.is_none() && lookup.data.is_empty() && keys.is_some_and(|k| !k.is_empty())
        {
            return Err(CoreError::KeyNotFound(lookup.unresolved.join(",")));
        }
        Ok(lookup)
    }

    /// Walk the chain from `start` resolving `unresolved`
    ///
    /// `data` and `depth` carry the state of earlier hops on other shards.
    /// The walk stops at the root, once every key resolved, or at the first
    /// dependency that is not stored here (reported in `next`).
    pub fn walk(
        &self,
        start: Location,
        mut unresolved: Vec<String>,
        mut data: BTreeMap<String, String>,
        mut depth: usize,
    ) -> Result<Lookup> {
        let mut current = start;
        let mut next = None;
        let mut first = true;

        while !current.is_root() && !unresolved.is_empty() {
            let node = match self.node(current) {
                Some(node) => node,
                None if first => return Err(CoreError::LocationNotFound(current)),
                None => {
                    next = Some(current);
                    break;
                }
            };
            first = false;

            depth += 1;
            if depth > self.max_chain_depth {
                return Err(CoreError::ChainTooDeep(self.max_chain_depth));
            }

            unresolved.retain(|key| match node.data.get(key) {
                Some(value) => {
                    data.insert(key.clone(), value.clone());
                    false
                }
                None => true,
            });

            match node.dependency {
                Some(dependency) => current = dependency,
                None => break,
            }
        }

        Ok(Lookup {
            data,
            unresolved,
            next,
            depth,
        })
    }

    // ==================== Set / children ====================

    /// Create a node building on `dependency`
    ///
    /// The new node is linked into its parent when the parent is stored
    /// here; otherwise the link is returned as a pending [`ChildUpdate`].
    pub fn set(&mut self, dependency: Location, data: BTreeMap<String, String>) -> Result<Insertion> {
        let node = Node::new(dependency, data)?;
        let location = node.location;

        if location.is_root() {
            return Err(CoreError::LocationCollision(location));
        }
        if let Some(existing) = self.node(location) {
            if existing.content_digest == node.content_digest {
                // Re-link so a retried Set repairs a lost remote AddChild
                let child = existing.as_child();
                let link = self.link(dependency, child)?;
                return Ok(Insertion {
                    location,
                    created: false,
                    link,
                });
            }
            return Err(CoreError::LocationCollision(location));
        }
        self.check_depth(dependency)?;

        let child = node.as_child();
        self.insert(node);
        let link = self.link(dependency, child)?;

        Ok(Insertion {
            location,
            created: true,
            link,
        })
    }

    /// Upsert `child` into `parent` and refresh digests toward the root
    pub fn add_child(&mut self, parent: Location, child: Child) -> Result<Link> {
        let node = self
            .node_mut(parent)
            .ok_or(CoreError::LocationNotFound(parent))?;
        let before = node.children.len();
        node.upsert_child(child);
        let siblings = node.children.len();
        let pending = self.propagate(parent)?;
        Ok(Link {
            parent,
            attached: siblings > before,
            siblings,
            pending,
        })
    }

    /// Detach every child of `parent`
    pub fn remove_children(&mut self, parent: Location) -> Result<Detachment> {
        let children: Vec<Location> = self
            .node(parent)
            .ok_or(CoreError::LocationNotFound(parent))?
            .children
            .iter()
            .map(|c| c.location)
            .collect();
        self.detach_children(parent, &children)
    }

    /// Detach the listed children of `parent`, ignoring unknown ones
    pub fn detach_children(&mut self, parent: Location, children: &[Location]) -> Result<Detachment> {
        let node = self
            .node_mut(parent)
            .ok_or(CoreError::LocationNotFound(parent))?;
        let removed: Vec<Location> = children
            .iter()
            .copied()
            .filter(|&child| node.remove_child(child))
            .collect();
        let pending = self.propagate(parent)?;
        Ok(Detachment { removed, pending })
    }

    /// Fail before any mutation if a refresh from `start` would exceed the bound
    fn check_depth(&self, start: Location) -> Result<()> {
        let mut current = Some(start);
        let mut depth = 0;
        while let Some(location) = current {
            let Some(node) = self.node(location) else {
                break;
            };
            depth += 1;
            if depth > self.max_chain_depth {
                return Err(CoreError::ChainTooDeep(self.max_chain_depth));
            }
            current = node.dependency;
        }
        Ok(())
    }

    /// Link `child` into `parent`, locally if possible
    fn link(&mut self, parent: Location, child: Child) -> Result<Link> {
        if self.contains(parent) {
            self.add_child(parent, child)
        } else {
            Ok(Link::deferred(parent, child))
        }
    }

    /// Recompute digests from `start` up to the root or the shard boundary
    pub(crate) fn propagate(&mut self, start: Location) -> Result<Option<ChildUpdate>> {
        let mut current = start;
        let mut depth = 0;

        loop {
            depth += 1;
            if depth > self.max_chain_depth {
                return Err(CoreError::ChainTooDeep(self.max_chain_depth));
            }

            let node = self
                .node_mut(current)
                .ok_or(CoreError::LocationNotFound(current))?;
            node.refresh_digest();
            let child = node.as_child();
            let Some(parent) = node.dependency else {
                return Ok(None);
            };

            match self.node_mut(parent) {
                Some(parent_node) => {
                    if !parent_node.upsert_child(child) {
                        return Ok(None);
                    }
                    current = parent;
                }
                None => return Ok(Some(ChildUpdate { parent, child })),
            }
        }
    }

    pub(crate) fn insert(&mut self, node: Node) {
        let location = node.location;
        match self.slots.get(&location) {
            Some(&slot) => {
                if self.nodes[slot].is_none() {
                    self.live += 1;
                }
                self.nodes[slot] = Some(node);
            }
            None => {
                self.slots.insert(location, self.nodes.len());
                self.nodes.push(Some(node));
                self.live += 1;
            }
        }
    }

    // ==================== Bulk insert / removal ====================

    /// Insert nodes verbatim, trusting their digests
    ///
    /// Nodes depending on the root are linked into the local root. Returns
    /// the number of nodes stored.
    pub fn add_nodes(&mut self, nodes: Vec<Node>) -> Result<usize> {
        let mut stored = 0;
        let mut root_changed = false;

        for mut node in nodes {
            if node.is_root() {
                return Err(CoreError::RootImmutable);
            }
            node.normalize_children();
            let child = node.as_child();
            let under_root = node.dependency == Some(Location::ROOT);
            self.insert(node);
            stored += 1;

            if under_root {
                root_changed |= self.root_mut().upsert_child(child);
            }
        }

        if root_changed {
            self.root_mut().refresh_digest();
        }
        debug!(stored, total = self.live, "added nodes");
        Ok(stored)
    }

    /// Tombstone a node in place
    ///
    /// A node depending on the root is detached from the local root. Other
    /// parents keep their cached child entry.
    pub fn remove_node(&mut self, location: Location) -> Result<Node> {
        if location.is_root() {
            return Err(CoreError::RootImmutable);
        }
        let slot = *self
            .slots
            .get(&location)
            .ok_or(CoreError::LocationNotFound(location))?;
        let node = self.nodes[slot]
            .take()
            .ok_or(CoreError::LocationNotFound(location))?;
        self.live -= 1;

        if node.dependency == Some(Location::ROOT) {
            let root = self.root_mut();
            if root.remove_child(location) {
                root.refresh_digest();
            }
        }
        Ok(node)
    }

    pub(crate) fn root_mut(&mut self) -> &mut Node {
        match self.nodes.first_mut().and_then(Option::as_mut) {
            Some(root) => root,
            None => unreachable!("root slot is never cleared"),
        }
    }

    // ==================== Split support ====================

    /// Median key hash of the nodes within `[low, high]`, clamped so both
    /// halves of the range are non-empty
    pub fn split_point(&self, low: u32, high: u32) -> Option<u32> {
        if low >= high {
            return None;
        }
        let mut hashes: Vec<u32> = self
            .iter()
            .map(Node::key_hash)
            .filter(|h| (low..=high).contains(h))
            .collect();
        if hashes.is_empty() {
            return None;
        }
        hashes.sort_unstable();
        let median = hashes[(hashes.len() - 1) / 2];
        Some(median.clamp(low, high - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_after_set() {
        let mut store = Store::new();
        let ins = store.set(Location::ROOT, data(&[("k", "v")])).unwrap();
        assert!(ins.created);
        assert_eq!(ins.link.pending, None);
        assert!(!ins.link.is_conflict());

        let lookup = store.get(ins.location, Some(&keys(&["k"]))).unwrap();
        assert_eq!(lookup.data.get("k").map(String::as_str), Some("v"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_full_mapping() {
        let mut store = Store::new();
        let ins = store
            .set(Location::ROOT, data(&[("a", "1"), ("b", "2")]))
            .unwrap();
        let lookup = store.get(ins.location, None).unwrap();
        assert_eq!(lookup.data, data(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn test_nearest_ancestor_wins() {
        let mut store = Store::new();
        let first = store.set(Location::ROOT, data(&[("k", "old")])).unwrap();
        let second = store
            .set(first.location, data(&[("k", "new"), ("other", "x")]))
            .unwrap();
        let third = store.set(second.location, data(&[("z", "1")])).unwrap();

        let lookup = store.get(third.location, Some(&keys(&["k"]))).unwrap();
        assert_eq!(lookup.data.get("k").map(String::as_str), Some("new"));
        assert_eq!(lookup.depth, 2);
    }

    #[test]
    fn test_partial_multi_key_get() {
        let mut store = Store::new();
        let ins = store.set(Location::ROOT, data(&[("a", "1")])).unwrap();

        let lookup = store
            .get(ins.location, Some(&keys(&["a", "missing"])))
            .unwrap();
        assert_eq!(lookup.data, data(&[("a", "1")]));
        assert_eq!(lookup.unresolved, keys(&["missing"]));

        let err = store.get(ins.location, Some(&keys(&["missing"]))).unwrap_err();
        assert!(matches!(err, CoreError::KeyNotFound(_)));
    }

    #[test]
    fn test_get_unknown_location() {
        let store = Store::new();
        let err = store.get(Location(42), None).unwrap_err();
        assert_eq!(err, CoreError::LocationNotFound(Location(42)));
    }

    #[test]
    fn test_walk_stops_at_remote_dependency() {
        let mut store = Store::new();
        let remote = Location(0xdead_beef_0000_0001);
        let ins = store.set(remote, data(&[("a", "1")])).unwrap();
        assert_eq!(
            ins.link.pending.as_ref().map(|p| p.parent),
            Some(remote),
            "link to a remote parent is deferred"
        );

        let lookup = store.get(ins.location, Some(&keys(&["a", "b"]))).unwrap();
        assert_eq!(lookup.next, Some(remote));
        assert_eq!(lookup.unresolved, keys(&["b"]));
        assert!(lookup.is_partial());
    }

    #[test]
    fn test_chain_depth_bound() {
        let mut store = Store::with_max_chain_depth(2);
        let a = store.set(Location::ROOT, data(&[("k", "1")])).unwrap();
        let b = store.set(a.location, data(&[("x", "2")])).unwrap();
        // Digest refresh from the third node walks three levels
        let err = store.set(b.location, data(&[("y", "3")])).unwrap_err();
        assert_eq!(err, CoreError::ChainTooDeep(2));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut store = Store::new();
        let first = store.set(Location::ROOT, data(&[("k", "v")])).unwrap();
        let again = store.set(Location::ROOT, data(&[("k", "v")])).unwrap();
        assert_eq!(first.location, again.location);
        assert!(!again.created);
        assert_eq!(store.len(), 1);
        assert_eq!(store.root().children.len(), 1);
    }

    #[test]
    fn test_repeated_set_relinks_remote_parent() {
        let mut store = Store::new();
        let remote = Location(0x1234_5678_0000_0009);
        let first = store.set(remote, data(&[("k", "v")])).unwrap();
        let again = store.set(remote, data(&[("k", "v")])).unwrap();
        assert!(!again.created);
        assert_eq!(again.link.pending, first.link.pending);
    }

    #[test]
    fn test_set_updates_ancestor_digests() {
        let mut store = Store::new();
        let parent = store.set(Location::ROOT, data(&[("p", "1")])).unwrap();
        let root_before = store.root().digest;
        let parent_before = store.node(parent.location).unwrap().digest;

        store.set(parent.location, data(&[("c", "2")])).unwrap();

        assert_ne!(store.node(parent.location).unwrap().digest, parent_before);
        assert_ne!(store.root().digest, root_before);
        assert_eq!(store.node(parent.location).unwrap().children.len(), 1);
    }

    #[test]
    fn test_second_child_is_conflict() {
        let mut store = Store::new();
        let parent = store.set(Location::ROOT, data(&[("p", "1")])).unwrap();
        let a = store.set(parent.location, data(&[("a", "1")])).unwrap();
        assert!(!a.link.is_conflict());
        let b = store.set(parent.location, data(&[("b", "1")])).unwrap();
        assert!(b.link.is_conflict());
        assert_eq!(b.link.siblings, 2);

        // Two children of the root never conflict
        let c = store.set(Location::ROOT, data(&[("c", "1")])).unwrap();
        assert!(!c.link.is_conflict());

        // A digest refresh of an existing child is not a new attachment
        let child = store.node(a.location).unwrap().as_child();
        let refreshed = store.add_child(parent.location, child).unwrap();
        assert!(!refreshed.attached);
    }

    #[test]
    fn test_virtual_locations() {
        let mut store = Store::new();
        let ins = store.set(Location::ROOT, data(&[("k", "v")])).unwrap();
        store.bind_virtual(1, 100, ins.location);

        assert_eq!(store.resolve(1, NodeRef::Virtual(100)), Ok(ins.location));
        assert_eq!(
            store.resolve(2, NodeRef::Virtual(100)),
            Err(CoreError::VirtualLocationNotFound {
                session_id: 2,
                virtual_location: 100
            })
        );

        assert!(store.end_session(1));
        assert!(!store.end_session(1));
        assert!(store.lookup_virtual(1, 100).is_none());
    }

    #[test]
    fn test_remove_node_and_revive() {
        let mut store = Store::new();
        let ins = store.set(Location::ROOT, data(&[("k", "v")])).unwrap();
        let empty_root = Node::root().digest;

        let node = store.remove_node(ins.location).unwrap();
        assert_eq!(store.len(), 0);
        assert!(!store.contains(ins.location));
        assert_eq!(store.root().digest, empty_root);

        store.add_nodes(vec![node]).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(ins.location));
        assert_eq!(store.root().children.len(), 1);
    }

    #[test]
    fn test_remove_root_rejected() {
        let mut store = Store::new();
        assert_eq!(
            store.remove_node(Location::ROOT),
            Err(CoreError::RootImmutable)
        );
    }

    #[test]
    fn test_remove_children() {
        let mut store = Store::new();
        let parent = store.set(Location::ROOT, data(&[("p", "1")])).unwrap();
        let a = store.set(parent.location, data(&[("a", "1")])).unwrap();
        let b = store.set(parent.location, data(&[("b", "1")])).unwrap();

        let mut detached = store.remove_children(parent.location).unwrap();
        detached.removed.sort();
        let mut expected = vec![a.location, b.location];
        expected.sort();
        assert_eq!(detached.removed, expected);
        assert!(store.node(parent.location).unwrap().children.is_empty());
    }

    #[test]
    fn test_detach_listed_children_only() {
        let mut store = Store::new();
        let parent = store.set(Location::ROOT, data(&[("p", "1")])).unwrap();
        let a = store.set(parent.location, data(&[("a", "1")])).unwrap();
        let b = store.set(parent.location, data(&[("b", "1")])).unwrap();

        let detached = store
            .detach_children(parent.location, &[a.location, Location(99)])
            .unwrap();
        assert_eq!(detached.removed, vec![a.location]);
        let remaining = &store.node(parent.location).unwrap().children;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].location, b.location);
    }

    #[test]
    fn test_split_point_within_range() {
        let mut store = Store::new();
        for i in 0..20 {
            store
                .set(Location::ROOT, data(&[(&format!("key-{i}"), "v")]))
                .unwrap();
        }
        let mid = store.split_point(0, u32::MAX).unwrap();
        assert!(mid < u32::MAX);

        let left = store.locations_in(0, mid).len();
        let right = store.locations_in(mid + 1, u32::MAX).len();
        assert_eq!(left + right, 20);
        assert!(left >= 10);

        assert_eq!(store.split_point(5, 5), None);
    }
}
