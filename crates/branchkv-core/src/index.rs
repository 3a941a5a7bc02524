//! Range index mapping key-hash ranges to servers
//!
//! The index is a sorted list of disjoint, inclusive ranges. Once seeded it
//! covers the whole key-hash domain `[0, u32::MAX]`; splits replace one range
//! by its two halves in a single step so the partition is never observed
//! incomplete.

use crate::error::{CoreError, Result};
use crate::hash::{key_hash, Location};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest key hash
pub const KEY_HASH_MIN: u32 = 0;

/// Largest key hash
pub const KEY_HASH_MAX: u32 = u32::MAX;

/// Inclusive range of key hashes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyRange {
    pub low: u32,
    pub high: u32,
}

impl KeyRange {
    /// Create a range, `low` must not exceed `high`
    pub fn new(low: u32, high: u32) -> Result<Self> {
        if low > high {
            return Err(CoreError::InvalidSplit(format!(
                "range low {low:#010x} above high {high:#010x}"
            )));
        }
        Ok(Self { low, high })
    }

    /// The whole key-hash domain
    pub fn full() -> Self {
        Self {
            low: KEY_HASH_MIN,
            high: KEY_HASH_MAX,
        }
    }

    /// Whether `hash` falls in the range
    pub fn contains(&self, hash: u32) -> bool {
        self.low <= hash && hash <= self.high
    }

    /// Whether two ranges share a key hash
    pub fn overlaps(&self, other: &KeyRange) -> bool {
        self.low <= other.high && other.low <= self.high
    }

    /// Halves `[low, mid]` and `[mid + 1, high]`
    pub fn split_at(&self, mid: u32) -> Result<(KeyRange, KeyRange)> {
        if mid < self.low || mid >= self.high {
            return Err(CoreError::InvalidSplit(format!(
                "midpoint {mid:#010x} outside [{:#010x}, {:#010x})",
                self.low, self.high
            )));
        }
        Ok((
            KeyRange {
                low: self.low,
                high: mid,
            },
            KeyRange {
                low: mid + 1,
                high: self.high,
            },
        ))
    }

    /// Number of key hashes covered
    pub fn width(&self) -> u64 {
        (self.high - self.low) as u64 + 1
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#010x}, {:#010x}]", self.low, self.high)
    }
}

/// A range owned by one server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub range: KeyRange,
    pub address: String,
}

/// Sorted, disjoint range to server mappings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeIndex {
    mappings: Vec<Mapping>,
}

impl RangeIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index where `address` owns the whole domain
    pub fn with_initial(address: impl Into<String>) -> Self {
        Self {
            mappings: vec![Mapping {
                range: KeyRange::full(),
                address: address.into(),
            }],
        }
    }

    /// All mappings in key-hash order
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Number of mappings
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether the index has no mappings
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Add a range that does not overlap any existing mapping
    pub fn add_mapping(&mut self, range: KeyRange, address: impl Into<String>) -> Result<()> {
        let pos = self.mappings.partition_point(|m| m.range.low < range.low);
        let clashes_prev = pos > 0 && self.mappings[pos - 1].range.overlaps(&range);
        let clashes_next = self
            .mappings
            .get(pos)
            .is_some_and(|m| m.range.overlaps(&range));
        if clashes_prev || clashes_next {
            return Err(CoreError::RangeOverlap {
                low: range.low,
                high: range.high,
            });
        }
        self.mappings.insert(
            pos,
            Mapping {
                range,
                address: address.into(),
            },
        );
        Ok(())
    }

    /// Remove the mapping for exactly `range`
    pub fn remove_mapping(&mut self, range: KeyRange) -> Option<Mapping> {
        let pos = self.position(range)?;
        Some(self.mappings.remove(pos))
    }

    fn position(&self, range: KeyRange) -> Option<usize> {
        self.mappings
            .binary_search_by(|m| m.range.low.cmp(&range.low))
            .ok()
            .filter(|&pos| self.mappings[pos].range == range)
    }

    fn find(&self, hash: u32) -> Option<&Mapping> {
        let pos = self.mappings.partition_point(|m| m.range.low <= hash);
        pos.checked_sub(1)
            .map(|p| &self.mappings[p])
            .filter(|m| m.range.contains(hash))
    }

    /// Server owning `hash`
    pub fn locate(&self, hash: u32) -> Result<&str> {
        self.find(hash)
            .map(|m| m.address.as_str())
            .ok_or(CoreError::RangeNotFound(hash))
    }

    /// Server owning `key`
    pub fn locate_key(&self, key: &str) -> Result<&str> {
        self.locate(key_hash(key))
    }

    /// Server owning the node at `location`
    pub fn locate_location(&self, location: Location) -> Result<&str> {
        self.locate(location.key_hash())
    }

    /// Range containing `hash`
    pub fn range_containing(&self, hash: u32) -> Result<KeyRange> {
        self.find(hash)
            .map(|m| m.range)
            .ok_or(CoreError::RangeNotFound(hash))
    }

    /// Range owned by `address`
    ///
    /// A server owns at most one range at a time since splits always hand
    /// one half to a spare.
    pub fn range_of(&self, address: &str) -> Option<KeyRange> {
        self.mappings
            .iter()
            .find(|m| m.address == address)
            .map(|m| m.range)
    }

    /// Replace `range` by `[low, mid] -> left` and `[mid + 1, high] -> right`
    ///
    /// Applying the same split twice is a no-op, so a re-delivered broadcast
    /// is harmless.
    pub fn apply_split(&mut self, range: KeyRange, mid: u32, left: &str, right: &str) -> Result<()> {
        let (low_half, high_half) = range.split_at(mid)?;

        let Some(pos) = self.position(range) else {
            let already = self.position(low_half).is_some_and(|p| {
                self.mappings[p].address == left
                    && self.mappings.get(p + 1)
                        == Some(&Mapping {
                            range: high_half,
                            address: right.to_string(),
                        })
            });
            if already {
                return Ok(());
            }
            return Err(CoreError::InvalidSplit(format!("range {range} is not mapped")));
        };

        self.mappings.splice(
            pos..=pos,
            [
                Mapping {
                    range: low_half,
                    address: left.to_string(),
                },
                Mapping {
                    range: high_half,
                    address: right.to_string(),
                },
            ],
        );
        Ok(())
    }

    /// Whether the mappings are disjoint and cover the whole domain
    pub fn is_complete(&self) -> bool {
        let Some(first) = self.mappings.first() else {
            return false;
        };
        if first.range.low != KEY_HASH_MIN {
            return false;
        }
        let contiguous = self
            .mappings
            .windows(2)
            .all(|w| w[0].range.high < KEY_HASH_MAX && w[0].range.high + 1 == w[1].range.low);
        contiguous && self.mappings.last().is_some_and(|m| m.range.high == KEY_HASH_MAX)
    }
}
