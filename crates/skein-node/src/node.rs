//! Skein Node
//!
//! One gossip member: it creates events on its own self-parent chain, runs
//! the three-phase exchange against peers, and expires its shadow graph.
//! Events cross between nodes in their encoded form, as they would on a wire.

use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use skein_core::{CreatorId, DagEvent, EventDescriptor, GossipEvent, Generation};
use skein_sync::{InsertableStatus, ShadowGraphManager, SyncRole, SyncSession};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CREATE_ATTEMPTS: usize = 3;

/// Counters kept by a node
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct NodeStats {
    /// Events created locally
    pub events_created: u64,
    /// Exchanges completed (either role)
    pub syncs: u64,
    /// Events sent to peers
    pub events_sent: u64,
    /// Events received from peers and accepted
    pub events_accepted: u64,
    /// Events received from peers and rejected
    pub events_rejected: u64,
    /// Rejected events whose parent had not arrived yet
    pub events_missing_parent: u64,
    /// Shadows removed by expiration
    pub shadows_expired: u64,
}

/// Result of one exchange between two nodes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Events the caller sent to the listener
    pub sent: usize,
    /// Events the listener sent to the caller
    pub received: usize,
    /// Received events the caller accepted
    pub accepted: usize,
    /// Received events the caller rejected
    pub rejected: usize,
}

/// A gossip member backed by one shadow graph
pub struct SkeinNode {
    name: String,
    creator: CreatorId,
    manager: Arc<ShadowGraphManager<GossipEvent>>,
    last_event: RwLock<Option<EventDescriptor>>,
    stats: RwLock<NodeStats>,
    max_send_batch: usize,
}

impl SkeinNode {
    /// Create a node with an empty shadow graph
    pub fn new(name: impl Into<String>, creator: CreatorId, max_send_batch: usize) -> Self {
        Self {
            name: name.into(),
            creator,
            manager: Arc::new(ShadowGraphManager::new()),
            last_event: RwLock::new(None),
            stats: RwLock::new(NodeStats::default()),
            max_send_batch,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn creator(&self) -> &CreatorId {
        &self.creator
    }

    pub fn manager(&self) -> &Arc<ShadowGraphManager<GossipEvent>> {
        &self.manager
    }

    pub fn stats(&self) -> NodeStats {
        self.stats.read().clone()
    }

    /// Descriptor of the latest event this node created
    pub fn last_event(&self) -> Option<EventDescriptor> {
        *self.last_event.read()
    }

    /// Create an event on this node's chain and insert it locally
    ///
    /// The self-parent is the previous own event; `other_parent` should be
    /// an event this node already holds.
    pub fn create_event(
        &self,
        other_parent: Option<EventDescriptor>,
        transactions: Vec<Vec<u8>>,
    ) -> anyhow::Result<Arc<GossipEvent>> {
        let mut last_event = self.last_event.write();

        for _ in 0..CREATE_ATTEMPTS {
            let event = Arc::new(self.build_event(*last_event, other_parent, transactions.clone())?);
            match self.manager.add_event(Arc::clone(&event)) {
                InsertableStatus::Insertable => {
                    *last_event = Some(event.descriptor());
                    self.stats.write().events_created += 1;
                    return Ok(event);
                }
                // Expiration raised the watermark past the generation we picked
                InsertableStatus::ExpiredEvent => continue,
                status => {
                    anyhow::bail!("{}: created event {} not insertable: {}", self.name, event.hash(), status)
                }
            }
        }

        anyhow::bail!("{}: watermark kept overtaking new events", self.name)
    }

    // Generation stays above the watermark even when our own chain has
    // fallen behind it
    fn build_event(
        &self,
        self_parent: Option<EventDescriptor>,
        other_parent: Option<EventDescriptor>,
        transactions: Vec<Vec<u8>>,
    ) -> anyhow::Result<GossipEvent> {
        let mut builder = GossipEvent::builder(self.creator).transactions(transactions);
        let mut generation = self.manager.expired_generation().saturating_add(1).max(0);
        for parent in [self_parent, other_parent].into_iter().flatten() {
            generation = generation.max(parent.generation.saturating_add(1));
        }
        if let Some(parent) = self_parent {
            builder = builder.self_parent(parent);
        }
        if let Some(parent) = other_parent {
            builder = builder.other_parent(parent);
        }
        Ok(builder.generation(generation).build()?)
    }

    /// Pick a random tip created by someone else as the next other-parent
    pub fn choose_other_parent(&self, rng: &mut impl Rng) -> Option<EventDescriptor> {
        let own = self.last_event().map(|d| d.hash);
        let candidates: Vec<_> = self
            .manager
            .tip_hashes()
            .into_iter()
            .filter(|hash| Some(*hash) != own)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let pick = candidates[rng.gen_range(0..candidates.len())];
        self.manager.event(&pick).map(|event| event.descriptor())
    }

    /// Run one full exchange with `peer`, this node as caller
    ///
    /// Both sides compute their send list before either applies anything, so
    /// the exchange behaves as if both halves ran on separate hosts.
    pub fn sync_with(&self, peer: &SkeinNode) -> anyhow::Result<SyncOutcome> {
        let mut local = SyncSession::new(self.name.clone(), peer.name.clone(), SyncRole::Caller);
        let mut remote = SyncSession::new(peer.name.clone(), self.name.clone(), SyncRole::Listener);

        // Phase 1
        let local_tips = self.manager.send_tip_hashes(&mut local)?;
        let remote_tips = peer.manager.send_tip_hashes(&mut remote)?;
        self.manager.set_received_tip_hashes(&mut local, remote_tips)?;
        peer.manager.set_received_tip_hashes(&mut remote, local_tips)?;

        // Phase 2
        let local_bools = self.manager.send_tip_booleans(&local)?;
        let remote_bools = peer.manager.send_tip_booleans(&remote)?;
        self.manager.set_received_tip_booleans(&mut local, &remote_bools)?;
        peer.manager.set_received_tip_booleans(&mut remote, &local_bools)?;

        // Phase 3
        let to_peer = encode_all(&self.manager.finish_send_list(&mut local)?)?;
        let to_self = encode_all(&peer.manager.finish_send_list(&mut remote)?)?;

        let (peer_accepted, peer_rejected) = peer.apply_received(&to_peer, &local.sync_log_label())?;
        let (accepted, rejected) = self.apply_received(&to_self, &remote.sync_log_label())?;

        self.record_sync(to_peer.len(), accepted, rejected);
        peer.record_sync(to_self.len(), peer_accepted, peer_rejected);

        debug!(
            "{}: sent {}, received {} ({} accepted, {} rejected)",
            local.sync_log_label(),
            to_peer.len(),
            to_self.len(),
            accepted,
            rejected
        );

        Ok(SyncOutcome {
            sent: to_peer.len(),
            received: to_self.len(),
            accepted,
            rejected,
        })
    }

    /// Decode and insert a received send list, in order
    fn apply_received(&self, encoded: &[Vec<u8>], label: &str) -> anyhow::Result<(usize, usize)> {
        if encoded.len() > self.max_send_batch {
            warn!(
                "{}: send list of {} events truncated to {}",
                label,
                encoded.len(),
                self.max_send_batch
            );
        }

        let mut accepted = 0;
        let mut rejected = 0;
        let mut missing_parent = 0;
        for bytes in encoded.iter().take(self.max_send_batch) {
            let event = GossipEvent::decode(bytes)?;
            let hash = event.hash();
            match self.manager.add_event(Arc::new(event)) {
                InsertableStatus::Insertable => accepted += 1,
                status if status.is_retryable() => {
                    debug!("{}: rejected {}, parent not received yet ({})", label, hash, status);
                    missing_parent += 1;
                    rejected += 1;
                }
                _ => rejected += 1,
            }
        }
        if missing_parent > 0 {
            self.stats.write().events_missing_parent += missing_parent;
        }
        Ok((accepted, rejected))
    }

    fn record_sync(&self, sent: usize, accepted: usize, rejected: usize) {
        let mut stats = self.stats.write();
        stats.syncs += 1;
        stats.events_sent += sent as u64;
        stats.events_accepted += accepted as u64;
        stats.events_rejected += rejected as u64;
    }

    /// Expire everything more than `retained` generations below the highest known
    ///
    /// Only ever raises the watermark. Returns the number of shadows removed.
    pub fn expire_retaining(&self, retained: Generation) -> usize {
        let Some(max) = self.manager.max_generation() else {
            return 0;
        };
        let target = max.saturating_sub(retained);
        if target <= self.manager.expired_generation() {
            return 0;
        }

        let removed = self.manager.expire_to(target);
        if removed > 0 {
            self.stats.write().shadows_expired += removed as u64;
            info!("{}: expired {} shadows at or below generation {}", self.name, removed, target);
        }
        removed
    }
}

fn encode_all(events: &[Arc<GossipEvent>]) -> anyhow::Result<Vec<Vec<u8>>> {
    events
        .iter()
        .map(|event| event.encode().map_err(anyhow::Error::from))
        .collect()
}
