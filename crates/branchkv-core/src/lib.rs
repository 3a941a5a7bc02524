//! # branchkv core
//!
//! Storage engine of the branchkv partitioned, versioned key-value store.
//!
//! This crate provides:
//! - **Hashing/addressing**: BLAKE3 digests, key hashes and content-derived node locations
//! - **Node Store**: a content-addressed, Merkle-hashed version DAG with
//!   dependency-chain lookups and anti-entropy synchronization
//! - **Range Index**: disjoint key-hash ranges mapped to the servers owning them
//! - **RPC types**: the JSON bodies exchanged between clients and servers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Coordinator (branchkv-server)    │
//! ├────────────────────┬────────────────────┤
//! │    Node Store      │    Range Index     │
//! │  get/set/upload/   │  locate/split      │
//! │  compare/download  │                    │
//! ├────────────────────┴────────────────────┤
//! │        Hashing / addressing             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use branchkv_core::{Location, Store};
//! use std::collections::BTreeMap;
//!
//! let mut store = Store::new();
//! let data = BTreeMap::from([("k".to_string(), "v".to_string())]);
//! let insertion = store.set(Location::ROOT, data).unwrap();
//!
//! let lookup = store.get(insertion.location, Some(&["k".to_string()])).unwrap();
//! assert_eq!(lookup.data["k"], "v");
//! ```

pub mod error;
pub mod hash;
pub mod index;
pub mod node;
pub mod rpc;
pub mod store;
pub mod sync;

pub use error::{CoreError, Result};
pub use hash::{hash, key_hash, Digest, Location};
pub use index::{KeyRange, Mapping, RangeIndex, KEY_HASH_MAX, KEY_HASH_MIN};
pub use node::{Child, ChildUpdate, MerkleEntry, Node, NodeRef, SessionId, VirtualLocation};
pub use store::{Detachment, Insertion, Link, Lookup, Store, DEFAULT_MAX_CHAIN_DEPTH};
pub use sync::{Classification, UploadOutcome};
