//! Shadow Graph Manager - event intake, tips, expiration and the exchange
//!
//! Two interfaces share one lock: event intake ([`add_event`], [`expire`])
//! mutates the graph, while gossip sessions read it through the three
//! exchange phases.
//!
//! ## Exchange (one run per peer per role)
//!
//! ```text
//!   phase 1   local tips ──────────────► peer
//!             local ◄────────────── peer tips
//!   phase 2   booleans (one per peer tip) ──► peer
//!             local ◄── booleans (one per local tip)
//!   phase 3   generation-sorted events the peer lacks ──► peer
//! ```
//!
//! Every public method takes the manager lock for its whole duration and
//! never across a network round-trip. Sessions are owned by the caller; the
//! phases only read the graph and accumulate into the session.
//!
//! [`add_event`]: ShadowGraphManager::add_event
//! [`expire`]: ShadowGraphManager::expire

use indexmap::IndexSet;
use parking_lot::Mutex;
use skein_core::{DagEvent, EventHash, Generation, NO_EXPIRED_GENERATION};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::{Result, SyncError};
use crate::graph::ShadowGraph;
use crate::insertable::InsertableStatus;
use crate::session::{SyncPhase, SyncSession};
use crate::shadow::ShadowEvent;

/// State guarded by the manager lock
struct ManagerState<E> {
    graph: ShadowGraph<E>,

    /// Shadows with no self-child, in insertion order
    tips: IndexSet<EventHash>,

    /// Events with generation at or below this are expired
    expired_generation: Generation,
}

impl<E: DagEvent> ManagerState<E> {
    fn is_expired(&self, generation: Generation) -> bool {
        generation <= self.expired_generation
    }

    fn classify(&self, event: Option<&E>) -> InsertableStatus {
        let Some(event) = event else {
            return InsertableStatus::NullEvent;
        };

        if self.graph.contains(&event.hash()) {
            return InsertableStatus::DuplicateShadowEvent;
        }

        // An expired event is never referenced by the graph
        if self.is_expired(event.generation()) {
            return InsertableStatus::ExpiredEvent;
        }

        if let Some(parent) = event.other_parent() {
            if !self.graph.contains(&parent.hash) && !self.is_expired(parent.generation) {
                return InsertableStatus::UnknownCurrentOtherParent;
            }
        }

        if let Some(parent) = event.self_parent() {
            if !self.graph.contains(&parent.hash) && !self.is_expired(parent.generation) {
                return InsertableStatus::UnknownCurrentSelfParent;
            }
        }

        // No parents at all starts a new tree in the forest
        InsertableStatus::Insertable
    }

    fn identify_tips(&mut self) {
        self.tips = self
            .graph
            .iter()
            .filter(|shadow| shadow.is_tip())
            .map(|shadow| shadow.hash())
            .collect();
    }

    fn expire(&mut self) -> usize {
        let watermark = self.expired_generation;
        let expired = |shadow: &ShadowEvent<E>| shadow.is_expired(watermark);

        let mut removed = 0;
        let mut expired_tips = Vec::new();

        // Trim expired tails below every tip, keeping the tip itself
        for tip in &self.tips {
            removed += self.graph.remove_strict_self_ancestry(tip, expired);
            let tip_expired = self
                .graph
                .get(tip)
                .map_or(true, |shadow| shadow.is_expired(watermark));
            if tip_expired {
                expired_tips.push(*tip);
            }
        }

        // Then drop tips that are themselves expired
        for tip in expired_tips {
            removed += self.graph.remove_self_ancestry(&tip, expired);
            self.tips.shift_remove(&tip);
        }

        removed
    }
}

/// Coordinates the shadow graph, its tips and the exchange protocol
pub struct ShadowGraphManager<E> {
    state: Mutex<ManagerState<E>>,
}

impl<E: DagEvent> ShadowGraphManager<E> {
    /// Create a manager with an empty graph and nothing expired
    pub fn new() -> Self {
        Self::with_graph(ShadowGraph::new(), NO_EXPIRED_GENERATION)
    }

    /// Adopt an existing shadow graph, identifying its tips
    pub fn with_graph(graph: ShadowGraph<E>, expired_generation: Generation) -> Self {
        let mut state = ManagerState {
            graph,
            tips: IndexSet::new(),
            expired_generation,
        };
        state.identify_tips();
        Self {
            state: Mutex::new(state),
        }
    }

    /// Reset to the constructed state: no shadows, no tips, nothing expired
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.graph.clear();
        state.tips.clear();
        state.expired_generation = NO_EXPIRED_GENERATION;
    }

    // ========================================================================
    // Event intake
    // ========================================================================

    /// Classify an event without inserting it
    pub fn classify(&self, event: Option<&E>) -> InsertableStatus {
        self.state.lock().classify(event)
    }

    /// Insert `event` if it is insertable and update the tip set
    ///
    /// Returns the classification; only `Insertable` means the event was added.
    pub fn add_event(&self, event: Arc<E>) -> InsertableStatus {
        let mut state = self.state.lock();
        let status = state.classify(Some(event.as_ref()));

        if !status.is_insertable() {
            if status == InsertableStatus::ExpiredEvent {
                debug!(
                    "add_event: did not insert, status is {} for event {} (generation {}), expired generation = {}",
                    status,
                    event.hash(),
                    event.generation(),
                    state.expired_generation
                );
            } else {
                debug!(
                    "add_event: did not insert, status is {} for event {} (generation {})",
                    status,
                    event.hash(),
                    event.generation()
                );
            }
            return status;
        }

        let hash = event.hash();
        let self_parent = event.self_parent();

        if let Err(err) = state.graph.insert(event) {
            warn!("add_event: {}", err);
            return InsertableStatus::DuplicateShadowEvent;
        }

        state.tips.insert(hash);
        if let Some(parent) = self_parent {
            state.tips.shift_remove(&parent.hash);
        }

        trace!("add_event: inserted {}", hash);
        status
    }

    // ========================================================================
    // Expiration
    // ========================================================================

    /// True iff the event's generation is at or below the watermark
    pub fn is_expired(&self, event: &E) -> bool {
        self.state.lock().is_expired(event.generation())
    }

    /// Advance the watermark to `new_expired_generation` and remove expired shadows
    ///
    /// Returns the number of shadows removed; a no-op when the watermark is unchanged.
    pub fn expire_to(&self, new_expired_generation: Generation) -> usize {
        debug!("expire: new expired generation {}", new_expired_generation);

        let mut state = self.state.lock();
        if new_expired_generation == state.expired_generation {
            return 0;
        }

        Self::update_expired_generation(&mut state, new_expired_generation);
        let removed = state.expire();
        if removed > 0 {
            debug!(
                "expire: removed {} shadow events at expired generation {}",
                removed, new_expired_generation
            );
        }
        removed
    }

    /// Remove shadows expired under the current watermark
    pub fn expire(&self) -> usize {
        self.state.lock().expire()
    }

    pub fn expired_generation(&self) -> Generation {
        self.state.lock().expired_generation
    }

    /// Set the watermark without sweeping
    ///
    /// Decreasing the watermark is allowed (reconnect may rewind it) but logged.
    pub fn set_expired_generation(&self, expired_generation: Generation) {
        let mut state = self.state.lock();
        Self::update_expired_generation(&mut state, expired_generation);
    }

    fn update_expired_generation(state: &mut ManagerState<E>, expired_generation: Generation) {
        if expired_generation < state.expired_generation {
            warn!(
                "expired generation decreased: {} -> {}",
                state.expired_generation, expired_generation
            );
        }
        state.expired_generation = expired_generation;
    }

    // ========================================================================
    // Phase 1: tip hashes
    // ========================================================================

    /// Phase 1 (send): current local tip hashes, recorded on the session
    pub fn send_tip_hashes(&self, session: &mut SyncSession<E>) -> Result<Vec<EventHash>> {
        if session.phase() >= SyncPhase::BooleansExchanged {
            return Err(SyncError::PhaseOrder {
                expected: SyncPhase::TipsExchanged,
                found: session.phase(),
            });
        }

        let tips = self.tip_hashes();
        session.record_sent_tips(tips.clone())?;
        trace!("{} phase 1: sending {} tip hashes", session.sync_log_label(), tips.len());
        Ok(tips)
    }

    /// Phase 1 (receive): apply the peer's tip hashes
    ///
    /// Every peer tip we also hold is marked as known to the peer and leaves
    /// the working tips; its strict self-descendants, which the peer cannot
    /// have, are queued for sending and leave the working tips too.
    pub fn set_received_tip_hashes(&self, session: &mut SyncSession<E>, received: Vec<EventHash>) -> Result<()> {
        if session.phase() != SyncPhase::Idle {
            return Err(SyncError::SessionReused("peer tips already applied"));
        }

        let state = self.state.lock();
        session.begin(received.clone(), state.tips.clone());

        let mut known = 0;
        for hash in &received {
            if !state.graph.contains(hash) {
                continue;
            }
            known += 1;

            session.mark_peer_has(*hash);
            session.remove_working_tip(hash);

            for descendant in state.graph.strict_self_descendants(hash) {
                if let Some(shadow) = state.graph.get(&descendant) {
                    if !shadow.is_expired(state.expired_generation) {
                        session.queue(shadow);
                    }
                }
                session.remove_working_tip(&descendant);
            }
        }

        debug!(
            "{} phase 1: {} of {} peer tips known, {} events queued, {} working tips",
            session.sync_log_label(),
            known,
            received.len(),
            session.send_list().len(),
            session.working_tips().len()
        );

        session.advance(SyncPhase::TipsExchanged);
        Ok(())
    }

    // ========================================================================
    // Phase 2: tip booleans
    // ========================================================================

    /// Phase 2 (send): one boolean per peer tip received in phase 1
    pub fn send_tip_booleans(&self, session: &SyncSession<E>) -> Result<Vec<bool>> {
        if session.phase() < SyncPhase::TipsExchanged || session.phase() == SyncPhase::Finished {
            return Err(SyncError::PhaseOrder {
                expected: SyncPhase::TipsExchanged,
                found: session.phase(),
            });
        }
        Ok(self.tip_booleans_for(session.received_tip_hashes()))
    }

    /// `true` for each hash we hold that already has a self-child locally
    pub fn tip_booleans_for(&self, hashes: &[EventHash]) -> Vec<bool> {
        let state = self.state.lock();
        hashes
            .iter()
            .map(|hash| {
                state
                    .graph
                    .get(hash)
                    .map_or(false, |shadow| shadow.num_self_children() > 0)
            })
            .collect()
    }

    /// Phase 2 (receive): apply the peer's booleans for the tips we sent
    ///
    /// A `true` means the peer already holds descendants of that tip, so it
    /// holds the tip as well.
    pub fn set_received_tip_booleans(&self, session: &mut SyncSession<E>, received: &[bool]) -> Result<()> {
        session.require_phase(SyncPhase::TipsExchanged)?;

        let sent = session.sent_tip_hashes().ok_or(SyncError::TipsNotSent)?.to_vec();
        if sent.len() != received.len() {
            return Err(SyncError::TipCountMismatch {
                expected: sent.len(),
                received: received.len(),
            });
        }

        let state = self.state.lock();
        for (hash, peer_has) in sent.iter().zip(received) {
            if !*peer_has {
                continue;
            }
            if !state.graph.contains(hash) {
                trace!("{} phase 2: tip {} expired since phase 1", session.sync_log_label(), hash);
                continue;
            }
            session.mark_peer_has(*hash);
            session.remove_working_tip(hash);
        }

        session.advance(SyncPhase::BooleansExchanged);
        Ok(())
    }

    // ========================================================================
    // Phase 3: send list
    // ========================================================================

    /// Phase 3 (send): complete the list of events to send to the peer
    ///
    /// Walks back along the self-parent chain of every remaining working tip,
    /// queuing events until reaching one that the peer can be shown to have
    /// through some descendant. The result is sorted by generation so the
    /// receiver always sees parents before children.
    pub fn finish_send_list(&self, session: &mut SyncSession<E>) -> Result<Vec<Arc<E>>> {
        session.require_phase(SyncPhase::BooleansExchanged)?;

        let state = self.state.lock();
        let working_tips: Vec<EventHash> = session.working_tips().iter().copied().collect();

        for tip in working_tips {
            let mut cursor = Some(tip);

            while let Some(hash) = cursor {
                let Some(shadow) = state.graph.get(&hash) else {
                    break;
                };
                // Ancestors of an expired shadow are expired too
                if session.is_marked_search(&hash) || shadow.is_expired(state.expired_generation) {
                    break;
                }

                let peer_has = session.is_marked_peer_has(&hash)
                    || state
                        .graph
                        .any_descendant(&hash, |descendant| session.is_marked_peer_has(descendant));
                if peer_has {
                    session.mark_search(hash);
                    break;
                }

                // Already queued means this chain was walked before
                if !session.queue(shadow) {
                    break;
                }
                cursor = shadow.self_parent().map(|parent| parent.hash);
            }
        }
        drop(state);

        session
            .send_list_mut()
            .sort_by_key(|event| event.generation());
        session.advance(SyncPhase::Finished);

        debug!(
            "{} phase 3: sending {} events",
            session.sync_log_label(),
            session.send_list().len()
        );
        Ok(session.send_list().to_vec())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn contains(&self, hash: &EventHash) -> bool {
        self.state.lock().graph.contains(hash)
    }

    /// The event shadowed under `hash`, if present
    pub fn event(&self, hash: &EventHash) -> Option<Arc<E>> {
        self.state
            .lock()
            .graph
            .get(hash)
            .map(|shadow| Arc::clone(shadow.event()))
    }

    /// Current tip hashes in tip insertion order
    pub fn tip_hashes(&self) -> Vec<EventHash> {
        self.state.lock().tips.iter().copied().collect()
    }

    pub fn num_tips(&self) -> usize {
        self.state.lock().tips.len()
    }

    pub fn num_shadow_events(&self) -> usize {
        self.state.lock().graph.len()
    }

    /// Highest generation currently shadowed
    pub fn max_generation(&self) -> Option<Generation> {
        self.state
            .lock()
            .graph
            .iter()
            .map(|shadow| shadow.generation())
            .max()
    }

    /// Run `f` against the graph while holding the manager lock
    pub fn inspect<R>(&self, f: impl FnOnce(&ShadowGraph<E>) -> R) -> R {
        f(&self.state.lock().graph)
    }

    /// Verify the tip and parent invariants
    ///
    /// Every shadow with no present self-child must be a tip and vice versa,
    /// and every parent missing from the graph must be expired.
    pub fn check_consistency(&self) -> Result<()> {
        let state = self.state.lock();

        for tip in &state.tips {
            if !state.graph.contains(tip) {
                return Err(SyncError::TipMismatch(*tip));
            }
        }

        for shadow in state.graph.iter() {
            let has_self_child = shadow
                .self_children()
                .any(|child| state.graph.contains(child));
            if has_self_child == state.tips.contains(&shadow.hash()) {
                return Err(SyncError::TipMismatch(shadow.hash()));
            }

            for parent in [shadow.self_parent(), shadow.other_parent()].into_iter().flatten() {
                if !state.graph.contains(&parent.hash) && !state.is_expired(parent.generation) {
                    return Err(SyncError::DanglingParent {
                        child: shadow.hash(),
                        parent: parent.hash,
                    });
                }
            }
        }

        Ok(())
    }
}

impl<E: DagEvent> Default for ShadowGraphManager<E> {
    fn default() -> Self {
        Self::new()
    }
}
