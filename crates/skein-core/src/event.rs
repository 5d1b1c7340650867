//! Gossip events - the DAG nodes exchanged between peers
//!
//! The shadow graph only needs an event's identity hash, its generation and
//! descriptors of its two parents. [`DagEvent`] is that boundary; everything
//! else an event carries (transactions, signatures) is opaque to sync.
//!
//! [`GossipEvent`] is the concrete event produced by Skein nodes:
//!
//! ```text
//!   creator A:   a1 ──► a2 ──► a3        (self-parent chain)
//!                        ▲
//!   creator B:   b1 ─────┘               (other-parent edge)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{CreatorId, EventDescriptor, EventHash, Generation, FIRST_GENERATION};

/// The view of an event the sync layer depends on
pub trait DagEvent: Send + Sync {
    /// Identity hash, unique per event
    fn hash(&self) -> EventHash;

    /// Causal depth; greater than both parents' generations
    fn generation(&self) -> Generation;

    /// Previous event by the same creator
    fn self_parent(&self) -> Option<EventDescriptor>;

    /// Event by another creator this event references
    fn other_parent(&self) -> Option<EventDescriptor>;

    /// Descriptor pointing at this event
    fn descriptor(&self) -> EventDescriptor {
        EventDescriptor::new(self.hash(), self.generation())
    }
}

/// A gossip event in the DAG
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipEvent {
    /// Unique event hash (BLAKE3 over the hashed fields)
    hash: EventHash,

    /// Node that created this event
    creator: CreatorId,

    /// max(parent generations) + 1, or 0 without parents
    generation: Generation,

    /// Previous event from the same creator
    self_parent: Option<EventDescriptor>,

    /// Event from another node that triggered this gossip
    other_parent: Option<EventDescriptor>,

    /// Opaque transaction payloads
    transactions: Vec<Vec<u8>>,

    /// Creation time in milliseconds since the Unix epoch
    timestamp: i64,
}

impl GossipEvent {
    /// Create a new event builder
    pub fn builder(creator: CreatorId) -> GossipEventBuilder {
        GossipEventBuilder::new(creator)
    }

    /// Create an event with no parents
    pub fn genesis(creator: CreatorId, transactions: Vec<Vec<u8>>) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let hash = Self::compute_hash(&creator, FIRST_GENERATION, None, None, &transactions, timestamp);
        Self {
            hash,
            creator,
            generation: FIRST_GENERATION,
            self_parent: None,
            other_parent: None,
            transactions,
            timestamp,
        }
    }

    pub fn creator(&self) -> &CreatorId {
        &self.creator
    }

    pub fn transactions(&self) -> &[Vec<u8>] {
        &self.transactions
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Encode for transmission
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a received event, rejecting it if the hash does not match its contents
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let event: Self = bincode::deserialize(bytes)?;
        let expected = Self::compute_hash(
            &event.creator,
            event.generation,
            event.self_parent.as_ref(),
            event.other_parent.as_ref(),
            &event.transactions,
            event.timestamp,
        );
        if expected != event.hash {
            return Err(CoreError::Serialization(format!(
                "hash mismatch for event {}",
                event.hash
            )));
        }
        Ok(event)
    }

    fn compute_hash(
        creator: &CreatorId,
        generation: Generation,
        self_parent: Option<&EventDescriptor>,
        other_parent: Option<&EventDescriptor>,
        transactions: &[Vec<u8>],
        timestamp: i64,
    ) -> EventHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(creator.as_bytes());
        hasher.update(&generation.to_le_bytes());
        for parent in [self_parent, other_parent] {
            match parent {
                Some(p) => {
                    hasher.update(&[1u8]);
                    hasher.update(p.hash.as_bytes());
                    hasher.update(&p.generation.to_le_bytes());
                }
                None => {
                    hasher.update(&[0u8]);
                }
            }
        }
        hasher.update(&(transactions.len() as u64).to_le_bytes());
        for tx in transactions {
            hasher.update(&(tx.len() as u64).to_le_bytes());
            hasher.update(tx);
        }
        hasher.update(&timestamp.to_le_bytes());
        EventHash::new(*hasher.finalize().as_bytes())
    }
}

impl DagEvent for GossipEvent {
    fn hash(&self) -> EventHash {
        self.hash
    }

    fn generation(&self) -> Generation {
        self.generation
    }

    fn self_parent(&self) -> Option<EventDescriptor> {
        self.self_parent
    }

    fn other_parent(&self) -> Option<EventDescriptor> {
        self.other_parent
    }
}

/// Builder for [`GossipEvent`]
pub struct GossipEventBuilder {
    creator: CreatorId,
    self_parent: Option<EventDescriptor>,
    other_parent: Option<EventDescriptor>,
    generation: Option<Generation>,
    transactions: Vec<Vec<u8>>,
    timestamp: Option<i64>,
}

impl GossipEventBuilder {
    pub fn new(creator: CreatorId) -> Self {
        Self {
            creator,
            self_parent: None,
            other_parent: None,
            generation: None,
            transactions: Vec::new(),
            timestamp: None,
        }
    }

    pub fn self_parent(mut self, parent: EventDescriptor) -> Self {
        self.self_parent = Some(parent);
        self
    }

    pub fn other_parent(mut self, parent: EventDescriptor) -> Self {
        self.other_parent = Some(parent);
        self
    }

    /// Override the derived generation. Must still exceed both parents.
    pub fn generation(mut self, generation: Generation) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn transaction(mut self, tx: impl Into<Vec<u8>>) -> Self {
        self.transactions.push(tx.into());
        self
    }

    pub fn transactions(mut self, txs: Vec<Vec<u8>>) -> Self {
        self.transactions = txs;
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> Result<GossipEvent> {
        if let (Some(sp), Some(op)) = (&self.self_parent, &self.other_parent) {
            if sp.hash == op.hash {
                return Err(CoreError::DuplicateParents(sp.hash));
            }
        }

        let max_parent = [self.self_parent, self.other_parent]
            .iter()
            .flatten()
            .map(|p| p.generation)
            .max();

        let generation = match (self.generation, max_parent) {
            (Some(generation), Some(parent)) if generation <= parent => {
                return Err(CoreError::InvalidGeneration { generation, parent });
            }
            (Some(generation), _) => generation,
            (None, Some(parent)) => parent.saturating_add(1),
            (None, None) => FIRST_GENERATION,
        };

        let timestamp = self
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let hash = GossipEvent::compute_hash(
            &self.creator,
            generation,
            self.self_parent.as_ref(),
            self.other_parent.as_ref(),
            &self.transactions,
            timestamp,
        );

        Ok(GossipEvent {
            hash,
            creator: self.creator,
            generation,
            self_parent: self.self_parent,
            other_parent: self.other_parent,
            transactions: self.transactions,
            timestamp,
        })
    }
}
