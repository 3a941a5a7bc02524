//! Hashing and addressing using BLAKE3
//!
//! A node is addressed by a [`Location`]: the upper 32 bits carry the key hash
//! of the node's routing key (which decides the owning shard), the lower 32 bits
//! carry a prefix of the node's content digest.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Size of a BLAKE3 hash output in bytes (256 bits)
pub const DIGEST_BYTE_SIZE: usize = 32;

/// A BLAKE3 digest, hex encoded on the wire
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_BYTE_SIZE]);

impl Digest {
    /// Create a digest from bytes
    pub fn new(bytes: [u8; DIGEST_BYTE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a hex string
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; DIGEST_BYTE_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Get the digest as bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_BYTE_SIZE] {
        &self.0
    }

    /// Convert to a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First four bytes as a big-endian integer
    pub fn prefix_u32(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Check if this digest is all zeros
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self([0u8; DIGEST_BYTE_SIZE])
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}..)", &self.to_hex()[..12])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<blake3::Hash> for Digest {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid digest: {}", s)))
    }
}

/// Content-derived identity of a node
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(pub u64);

impl Location {
    /// The per-store root sentinel
    pub const ROOT: Location = Location(0);

    /// Combine a routing key hash with the content digest prefix
    pub fn derive(key_hash: u32, content_digest: &Digest) -> Self {
        Self(((key_hash as u64) << 32) | content_digest.prefix_u32() as u64)
    }

    /// Key hash used to route this location to its shard
    pub fn key_hash(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Whether this is the root sentinel
    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({:#018x})", self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl From<u64> for Location {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Hash arbitrary bytes
pub fn hash(data: &[u8]) -> Digest {
    blake3::hash(data).into()
}

/// Partitioning hash of a key
pub fn key_hash(key: &str) -> u32 {
    hash(key.as_bytes()).prefix_u32()
}

/// Digest over an update payload and the node it builds on
pub fn content_digest(dependency: Location, data: &BTreeMap<String, String>) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&dependency.0.to_be_bytes());
    for (key, value) in data {
        hasher.update(&(key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update(&(value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.finalize().into()
}

/// Merkle digest over a node's own content and its children's digests
///
/// `children` must be sorted by location.
pub fn merkle_digest<'a>(
    content: &Digest,
    children: impl IntoIterator<Item = (&'a Location, &'a Digest)>,
) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(content.as_bytes());
    for (location, digest) in children {
        hasher.update(&location.0.to_be_bytes());
        hasher.update(digest.as_bytes());
    }
    hasher.finalize().into()
}
