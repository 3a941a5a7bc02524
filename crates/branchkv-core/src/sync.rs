//! Anti-entropy operations on the node store
//!
//! A replica fetches the Merkle projection of a peer subtree, compares it
//! against its own nodes, downloads only the topmost nodes it is missing and
//! uploads them locally.

use crate::error::{CoreError, Result};
use crate::hash::Location;
use crate::node::{ChildUpdate, MerkleEntry, Node};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Classification of a remote node during [`Store::compare`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Digest matches, the whole subtree is identical
    Same,
    /// Payload missing locally, the whole subtree must be fetched
    Outdated,
    /// Payload present but the subtree differs, children are examined
    Descend,
}

/// Outcome of an upload
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Nodes that did not exist before
    pub inserted: usize,
    /// Existing nodes whose children were merged
    pub merged: usize,
    /// Links to parents stored on other shards
    pub pending: Vec<ChildUpdate>,
}

impl Store {
    /// Breadth-first projection of the local subtree rooted at `root`
    ///
    /// Children stored on other shards are not followed.
    pub fn merkle_tree(&self, root: Location) -> Result<Vec<MerkleEntry>> {
        let mut entries = Vec::new();
        self.breadth_first(&[root], |node| entries.push(node.merkle_entry()))?;
        Ok(entries)
    }

    /// Full nodes of the local subtrees rooted at `locations`, parents first
    pub fn download(&self, locations: &[Location]) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        self.breadth_first(locations, |node| nodes.push(node.clone()))?;
        Ok(nodes)
    }

    fn breadth_first<'a>(
        &'a self,
        roots: &[Location],
        mut visit: impl FnMut(&'a Node),
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();

        for &root in roots {
            if !self.contains(root) {
                return Err(CoreError::LocationNotFound(root));
            }
            if seen.insert(root) {
                queue.push_back(root);
            }
        }

        while let Some(location) = queue.pop_front() {
            let Some(node) = self.node(location) else {
                continue;
            };
            visit(node);
            for child in &node.children {
                if self.contains(child.location) && seen.insert(child.location) {
                    queue.push_back(child.location);
                }
            }
        }
        Ok(())
    }

    /// Store downloaded nodes, merging into nodes that already exist
    ///
    /// `nodes` must be ordered parents first. An existing node keeps its
    /// payload and gains the incoming children. New nodes are linked into
    /// their parent when it is stored here.
    pub fn upload(&mut self, nodes: Vec<Node>) -> Result<UploadOutcome> {
        let mut outcome = UploadOutcome::default();

        for mut incoming in nodes {
            incoming.normalize_children();
            let location = incoming.location;

            if let Some(existing) = self.node_mut(location) {
                let mut changed = false;
                for child in incoming.children {
                    changed |= existing.upsert_child(child);
                }
                outcome.merged += 1;
                if changed {
                    if let Some(update) = self.propagate(location)? {
                        outcome.pending.push(update);
                    }
                }
                continue;
            }

            if incoming.is_root() {
                return Err(CoreError::RootImmutable);
            }
            incoming.refresh_digest();
            let child = incoming.as_child();
            let dependency = incoming.dependency;
            self.insert(incoming);
            outcome.inserted += 1;

            let Some(parent) = dependency else {
                continue;
            };
            match self.node_mut(parent) {
                Some(parent_node) => {
                    if parent_node.upsert_child(child) {
                        if let Some(update) = self.propagate(parent)? {
                            outcome.pending.push(update);
                        }
                    }
                }
                None => outcome.pending.push(ChildUpdate { parent, child }),
            }
        }

        debug!(
            inserted = outcome.inserted,
            merged = outcome.merged,
            pending = outcome.pending.len(),
            "uploaded nodes"
        );
        Ok(outcome)
    }

    /// Locations of the topmost remote nodes whose payload is missing here
    ///
    /// `remote` must be ordered parents first, as produced by
    /// [`Store::merkle_tree`]. A node inherits the classification of a parent
    /// classified same or outdated and is never compared itself.
    pub fn compare(&self, remote: &[MerkleEntry]) -> Vec<Location> {
        let mut classes: HashMap<Location, Classification> = HashMap::with_capacity(remote.len());
        let mut outdated = Vec::new();

        for entry in remote {
            let inherited = entry
                .dependency
                .and_then(|dep| classes.get(&dep).copied())
                .filter(|class| *class != Classification::Descend);

            let class = match inherited {
                Some(class) => class,
                None => {
                    let class = self.classify(entry);
                    if class == Classification::Outdated {
                        outdated.push(entry.location);
                    }
                    class
                }
            };
            classes.insert(entry.location, class);
        }

        outdated
    }

    fn classify(&self, entry: &MerkleEntry) -> Classification {
        match self.node(entry.location) {
            None => Classification::Outdated,
            Some(local) if local.digest == entry.digest => Classification::Same,
            Some(local) if local.content_digest == entry.content_digest => {
                Classification::Descend
            }
            Some(_) => Classification::Outdated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn data(key: &str, value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(key.to_string(), value.to_string())])
    }

    /// root -> a -> (b, c)
    fn sample(leaf_value: &str) -> (Store, Location, Location) {
        let mut store = Store::new();
        let a = store.set(Location::ROOT, data("a", "1")).unwrap().location;
        store.set(a, data("b", "2")).unwrap();
        let c = store.set(a, data("c", leaf_value)).unwrap().location;
        (store, a, c)
    }

    #[test]
    fn test_merkle_tree_is_breadth_first() {
        let (store, a, _) = sample("3");
        let tree = store.merkle_tree(Location::ROOT).unwrap();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree[0].location, Location::ROOT);
        assert_eq!(tree[1].location, a);
        assert!(tree[2..].iter().all(|e| e.dependency == Some(a)));
    }

    #[test]
    fn test_merkle_tree_unknown_root() {
        let store = Store::new();
        assert_eq!(
            store.merkle_tree(Location(7)),
            Err(CoreError::LocationNotFound(Location(7)))
        );
    }

    #[test]
    fn test_compare_identical_is_empty() {
        let (local, _, _) = sample("3");
        let (remote, _, _) = sample("3");
        let projection = remote.merkle_tree(Location::ROOT).unwrap();
        assert!(local.compare(&projection).is_empty());
    }

    #[test]
    fn test_compare_flags_mutated_leaf() {
        let (local, _, _) = sample("3");
        let (remote, _, changed) = sample("changed");
        let projection = remote.merkle_tree(Location::ROOT).unwrap();
        assert_eq!(local.compare(&projection), vec![changed]);
    }

    #[test]
    fn test_compare_prunes_missing_subtree() {
        let local = Store::new();
        let (remote, a, _) = sample("3");
        let projection = remote.merkle_tree(Location::ROOT).unwrap();
        // Only the topmost missing node is listed, its children inherit
        assert_eq!(local.compare(&projection), vec![a]);
    }

    #[test]
    fn test_download_then_upload_converges() {
        let (remote, a, _) = sample("3");
        let mut local = Store::new();

        let projection = remote.merkle_tree(Location::ROOT).unwrap();
        let outdated = local.compare(&projection);
        let nodes = remote.download(&outdated).unwrap();
        assert_eq!(nodes[0].location, a);

        let outcome = local.upload(nodes).unwrap();
        assert_eq!(outcome.inserted, 3);
        assert!(outcome.pending.is_empty());
        assert_eq!(local.len(), remote.len());
        assert_eq!(local.root().digest, remote.root().digest);
        assert!(local.compare(&projection).is_empty());
    }

    #[test]
    fn test_upload_twice_keeps_count() {
        let (remote, a, _) = sample("3");
        let mut local = Store::new();
        let nodes = remote.download(&[a]).unwrap();

        local.upload(nodes.clone()).unwrap();
        let count = local.len();
        let outcome = local.upload(nodes).unwrap();
        assert_eq!(local.len(), count);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.merged, 3);
    }

    #[test]
    fn test_upload_merges_children() {
        let (mut local, a, _) = sample("3");
        let (mut remote, _, _) = sample("3");
        let extra = remote.set(a, data("d", "4")).unwrap().location;

        let nodes = remote.download(&[a]).unwrap();
        local.upload(nodes).unwrap();

        assert!(local.contains(extra));
        assert_eq!(local.node(a).unwrap().children.len(), 3);
        assert_eq!(local.root().digest, remote.root().digest);
    }
}
