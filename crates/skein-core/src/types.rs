//! Core type definitions for Skein
//!
//! Identity hashes, generations and creator identifiers shared by every
//! crate in the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Generation - causal depth of an event in the DAG
///
/// Strictly increases along every parent-to-child edge. Signed so that the
/// "nothing expired yet" watermark can sit below every real generation.
pub type Generation = i64;

/// Watermark value meaning no event has expired yet
pub const NO_EXPIRED_GENERATION: Generation = Generation::MIN;

/// Generation assigned to an event with no parents
pub const FIRST_GENERATION: Generation = 0;

/// EventHash - Unique identity of an event computed from BLAKE3
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EventHash {
    /// 256-bit BLAKE3 hash
    hash: [u8; 32],
}

impl EventHash {
    /// Create a new EventHash from raw bytes
    pub const fn new(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    /// Create EventHash from arbitrary bytes using BLAKE3
    pub fn from_content(content: &[u8]) -> Self {
        let hash = blake3::hash(content);
        Self {
            hash: *hash.as_bytes(),
        }
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let hash: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidHashLength(bytes.len()))?;
        Ok(Self { hash })
    }
}

impl fmt::Debug for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// CreatorId - Identifies the node that created an event
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CreatorId {
    id: [u8; 32],
}

impl CreatorId {
    pub const fn new(id: [u8; 32]) -> Self {
        Self { id }
    }

    /// Derive a creator id from a public key
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let hash = blake3::hash(public_key);
        Self {
            id: *hash.as_bytes(),
        }
    }

    /// Deterministic creator id for a numbered node (simulations, tests)
    pub fn from_index(index: u64) -> Self {
        Self::from_public_key(&index.to_le_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.id
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }
}

impl fmt::Debug for CreatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CreatorId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for CreatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// Reference from an event to one of its parents
///
/// Carries the parent's generation so a receiver can tell an expired parent
/// from a missing one without holding the parent itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub hash: EventHash,
    pub generation: Generation,
}

impl EventDescriptor {
    pub fn new(hash: EventHash, generation: Generation) -> Self {
        Self { hash, generation }
    }
}
