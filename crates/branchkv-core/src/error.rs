//! Error types for the branchkv-core crate

use crate::hash::Location;
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in node store and range index operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// None of the requested keys resolved along the dependency chain
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Location is not stored here (never written, or tombstoned)
    #[error("location not found: {0}")]
    LocationNotFound(Location),

    /// Virtual handle unknown for the session
    #[error("virtual location {virtual_location} not found in session {session_id}")]
    VirtualLocationNotFound {
        session_id: u64,
        virtual_location: u64,
    },

    /// No range covers the key hash; the partition invariant is broken
    #[error("no range covers key hash {0:#010x}")]
    RangeNotFound(u32),

    /// A new mapping would overlap an existing one
    #[error("range [{low:#010x}, {high:#010x}] overlaps an existing mapping")]
    RangeOverlap { low: u32, high: u32 },

    /// Split request does not match the index
    #[error("invalid split: {0}")]
    InvalidSplit(String),

    /// Two different payloads derived the same location
    #[error("location collision at {0}")]
    LocationCollision(Location),

    /// Walk toward the root exceeded the configured bound
    #[error("dependency chain deeper than {0} nodes")]
    ChainTooDeep(usize),

    /// Set without any key/value pair
    #[error("update carries no data")]
    EmptyUpdate,

    /// The root sentinel cannot be removed or replaced
    #[error("the root node cannot be modified this way")]
    RootImmutable,
}

impl CoreError {
    /// Whether the error is a regular "not found" outcome rather than a fault
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound(_) | Self::LocationNotFound(_) | Self::VirtualLocationNotFound { .. }
        )
    }
}
