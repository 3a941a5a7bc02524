//! Node types of the version DAG

use crate::error::{CoreError, Result};
use crate::hash::{self, Digest, Location};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Session-local handle for a node whose real location the caller does not know yet
pub type VirtualLocation = u64;

/// Identifier of a client session owning virtual handles
pub type SessionId = u64;

/// Child entry cached in the parent
///
/// The child digest is cached so the parent's Merkle digest can be
/// recomputed even when the child lives on another shard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    /// Location of the child node
    pub location: Location,
    /// Merkle digest of the child subtree
    pub digest: Digest,
}

impl Child {
    /// Create a new child entry
    pub fn new(location: Location, digest: Digest) -> Self {
        Self { location, digest }
    }
}

/// One update in the version DAG
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Content-derived identity
    pub location: Location,
    /// Node this update builds on, `None` only for the root
    pub dependency: Option<Location>,
    /// Update payload
    pub data: BTreeMap<String, String>,
    /// Nodes depending on this one, sorted by location
    #[serde(default)]
    pub children: Vec<Child>,
    /// Merkle digest over content and children
    pub digest: Digest,
    /// Digest of the payload and dependency only
    pub content_digest: Digest,
}

impl Node {
    /// Create the per-store root sentinel
    pub fn root() -> Self {
        let content_digest = hash::hash(b"branchkv/root");
        Self {
            location: Location::ROOT,
            dependency: None,
            data: BTreeMap::new(),
            children: Vec::new(),
            digest: hash::merkle_digest(&content_digest, std::iter::empty()),
            content_digest,
        }
    }

    /// Create a new leaf node building on `dependency`
    pub fn new(dependency: Location, data: BTreeMap<String, String>) -> Result<Self> {
        let routing_key = data.keys().next().ok_or(CoreError::EmptyUpdate)?;
        let content_digest = hash::content_digest(dependency, &data);
        let location = Location::derive(hash::key_hash(routing_key), &content_digest);

        Ok(Self {
            location,
            dependency: Some(dependency),
            data,
            children: Vec::new(),
            digest: hash::merkle_digest(&content_digest, std::iter::empty()),
            content_digest,
        })
    }

    /// Smallest key of the payload, used to route the node
    pub fn routing_key(&self) -> Option<&str> {
        self.data.keys().next().map(String::as_str)
    }

    /// Key hash of the shard owning this node
    pub fn key_hash(&self) -> u32 {
        self.location.key_hash()
    }

    /// Check if this is the root sentinel
    pub fn is_root(&self) -> bool {
        self.location.is_root()
    }

    /// Insert or update a child entry, returns true if anything changed
    pub fn upsert_child(&mut self, child: Child) -> bool {
        match self
            .children
            .binary_search_by(|c| c.location.cmp(&child.location))
        {
            Ok(pos) => {
                if self.children[pos].digest == child.digest {
                    return false;
                }
                self.children[pos].digest = child.digest;
            }
            Err(pos) => self.children.insert(pos, child),
        }
        true
    }

    /// Remove a child entry, returns true if it was present
    pub fn remove_child(&mut self, location: Location) -> bool {
        match self
            .children
            .binary_search_by(|c| c.location.cmp(&location))
        {
            Ok(pos) => {
                self.children.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Recompute the Merkle digest from the cached child digests
    ///
    /// Returns true if the digest changed.
    pub fn refresh_digest(&mut self) -> bool {
        let digest = hash::merkle_digest(
            &self.content_digest,
            self.children.iter().map(|c| (&c.location, &c.digest)),
        );
        let changed = digest != self.digest;
        self.digest = digest;
        changed
    }

    /// Sort and deduplicate children received from the wire
    pub fn normalize_children(&mut self) {
        self.children.sort_by(|a, b| a.location.cmp(&b.location));
        self.children.dedup_by(|a, b| a.location == b.location);
    }

    /// Entry for the parent's child list
    pub fn as_child(&self) -> Child {
        Child::new(self.location, self.digest)
    }

    /// Payload-free projection of this node
    pub fn merkle_entry(&self) -> MerkleEntry {
        MerkleEntry {
            location: self.location,
            dependency: self.dependency,
            digest: self.digest,
            content_digest: self.content_digest,
            children: self.children.iter().map(|c| c.location).collect(),
        }
    }
}

/// Payload-free projection used for anti-entropy comparison
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleEntry {
    pub location: Location,
    pub dependency: Option<Location>,
    pub digest: Digest,
    pub content_digest: Digest,
    pub children: Vec<Location>,
}

/// Reference to a starting node or a dependency
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// The per-store root sentinel
    Root,
    /// A real location
    Location(Location),
    /// A session-local virtual handle
    Virtual(VirtualLocation),
}

impl NodeRef {
    /// Build a reference from the flat wire fields; a present virtual handle wins
    pub fn from_parts(location: Option<Location>, virtual_location: Option<VirtualLocation>) -> Self {
        match (virtual_location, location) {
            (Some(v), _) => Self::Virtual(v),
            (None, Some(l)) if !l.is_root() => Self::Location(l),
            _ => Self::Root,
        }
    }

    /// Split into the flat wire fields
    pub fn into_parts(self) -> (Option<Location>, Option<VirtualLocation>) {
        match self {
            Self::Root => (Some(Location::ROOT), None),
            Self::Location(l) => (Some(l), None),
            Self::Virtual(v) => (None, Some(v)),
        }
    }
}

impl From<Location> for NodeRef {
    fn from(location: Location) -> Self {
        if location.is_root() {
            Self::Root
        } else {
            Self::Location(location)
        }
    }
}

/// Refresh of a cached child digest that must be applied at another shard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildUpdate {
    /// Parent to update
    pub parent: Location,
    /// New child entry
    pub child: Child,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_new_node_routes_by_smallest_key() {
        let node = Node::new(Location::ROOT, data(&[("b", "2"), ("a", "1")])).unwrap();
        assert_eq!(node.routing_key(), Some("a"));
        assert_eq!(node.key_hash(), hash::key_hash("a"));
        assert_eq!(node.dependency, Some(Location::ROOT));
    }

    #[test]
    fn test_empty_update_rejected() {
        assert_eq!(
            Node::new(Location::ROOT, BTreeMap::new()),
            Err(CoreError::EmptyUpdate)
        );
    }

    #[test]
    fn test_same_payload_different_dependency() {
        let a = Node::new(Location::ROOT, data(&[("k", "v")])).unwrap();
        let b = Node::new(a.location, data(&[("k", "v")])).unwrap();
        assert_ne!(a.location, b.location);
        assert_eq!(a.key_hash(), b.key_hash());
    }

    #[test]
    fn test_upsert_child_keeps_order() {
        let mut node = Node::root();
        let before = node.digest;
        assert!(node.upsert_child(Child::new(Location(9), hash::hash(b"9"))));
        assert!(node.upsert_child(Child::new(Location(3), hash::hash(b"3"))));
        assert!(!node.upsert_child(Child::new(Location(3), hash::hash(b"3"))));
        assert!(node.refresh_digest());
        assert_ne!(node.digest, before);

        let order: Vec<_> = node.children.iter().map(|c| c.location).collect();
        assert_eq!(order, vec![Location(3), Location(9)]);

        assert!(node.remove_child(Location(3)));
        assert!(!node.remove_child(Location(3)));
    }

    #[test]
    fn test_node_ref_prefers_virtual() {
        assert_eq!(
            NodeRef::from_parts(Some(Location(5)), Some(7)),
            NodeRef::Virtual(7)
        );
        assert_eq!(
            NodeRef::from_parts(Some(Location(5)), None),
            NodeRef::Location(Location(5))
        );
        assert_eq!(NodeRef::from_parts(None, None), NodeRef::Root);
        assert_eq!(NodeRef::from_parts(Some(Location::ROOT), None), NodeRef::Root);
    }
}
