//! Sync Session - transient per-peer exchange state
//!
//! One session per protocol run against one peer. Owned by that run only; it
//! is never shared between threads and needs no locking. Dropping a session
//! between phases leaves nothing to clean up in the shared graph.

use hashbrown::{HashMap, HashSet};
use indexmap::IndexSet;
use skein_core::EventHash;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SyncError};
use crate::shadow::ShadowEvent;

/// Which side of the connection this node is on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncRole {
    /// This node initiated the connection
    Caller,
    /// The peer initiated the connection
    Listener,
}

impl fmt::Display for SyncRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncRole::Caller => write!(f, "caller"),
            SyncRole::Listener => write!(f, "listener"),
        }
    }
}

/// Progress of a session through the exchange
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncPhase {
    /// Nothing received yet
    Idle,
    /// Peer tip hashes applied (phase 1 complete)
    TipsExchanged,
    /// Peer tip booleans applied (phase 2 complete)
    BooleansExchanged,
    /// Send list produced (phase 3 complete)
    Finished,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::TipsExchanged => "tips-exchanged",
            SyncPhase::BooleansExchanged => "booleans-exchanged",
            SyncPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Per-shadow flag set during the exchange
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMark {
    /// The peer already has this event
    PeerHas,
    /// Search for a divergence point stopped at this event
    Search,
}

/// State of one event exchange with one peer
pub struct SyncSession<E> {
    local: String,
    peer: String,
    role: SyncRole,
    phase: SyncPhase,

    /// Local tip hashes sent in phase 1, in the order sent
    sent_tip_hashes: Option<Vec<EventHash>>,

    /// Peer tip hashes received in phase 1
    received_tip_hashes: Vec<EventHash>,

    /// Snapshot of local tips, drained as the peer's knowledge is learned
    working_tips: IndexSet<EventHash>,

    /// Events to send, at most once each
    send_list: Vec<Arc<E>>,
    queued: HashSet<EventHash>,

    marks: HashMap<EventHash, SyncMark>,
}

impl<E> SyncSession<E> {
    /// Create a session for one exchange between `local` and `peer`
    pub fn new(local: impl Into<String>, peer: impl Into<String>, role: SyncRole) -> Self {
        Self {
            local: local.into(),
            peer: peer.into(),
            role,
            phase: SyncPhase::Idle,
            sent_tip_hashes: None,
            received_tip_hashes: Vec::new(),
            working_tips: IndexSet::new(),
            send_list: Vec::new(),
            queued: HashSet::new(),
            marks: HashMap::new(),
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn role(&self) -> SyncRole {
        self.role
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Identifies the connection in log output
    pub fn sync_log_label(&self) -> String {
        format!("{}->{} ({})", self.local, self.peer, self.role)
    }

    pub fn sent_tip_hashes(&self) -> Option<&[EventHash]> {
        self.sent_tip_hashes.as_deref()
    }

    pub fn received_tip_hashes(&self) -> &[EventHash] {
        &self.received_tip_hashes
    }

    pub fn working_tips(&self) -> &IndexSet<EventHash> {
        &self.working_tips
    }

    pub fn send_list(&self) -> &[Arc<E>] {
        &self.send_list
    }

    pub fn mark(&self, hash: &EventHash) -> Option<SyncMark> {
        self.marks.get(hash).copied()
    }

    pub fn is_marked_peer_has(&self, hash: &EventHash) -> bool {
        self.mark(hash) == Some(SyncMark::PeerHas)
    }

    pub fn is_marked_search(&self, hash: &EventHash) -> bool {
        self.mark(hash) == Some(SyncMark::Search)
    }

    pub fn is_queued(&self, hash: &EventHash) -> bool {
        self.queued.contains(hash)
    }

    pub(crate) fn require_phase(&self, expected: SyncPhase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(SyncError::PhaseOrder {
                expected,
                found: self.phase,
            })
        }
    }

    pub(crate) fn advance(&mut self, phase: SyncPhase) {
        self.phase = phase;
    }

    pub(crate) fn record_sent_tips(&mut self, tips: Vec<EventHash>) -> Result<()> {
        if self.sent_tip_hashes.is_some() {
            return Err(SyncError::SessionReused("local tips already sent"));
        }
        self.sent_tip_hashes = Some(tips);
        Ok(())
    }

    pub(crate) fn begin(&mut self, received: Vec<EventHash>, working_tips: IndexSet<EventHash>) {
        self.received_tip_hashes = received;
        self.working_tips = working_tips;
    }

    pub(crate) fn remove_working_tip(&mut self, hash: &EventHash) -> bool {
        self.working_tips.shift_remove(hash)
    }

    pub(crate) fn mark_peer_has(&mut self, hash: EventHash) {
        self.marks.insert(hash, SyncMark::PeerHas);
    }

    pub(crate) fn mark_search(&mut self, hash: EventHash) {
        self.marks.insert(hash, SyncMark::Search);
    }

    /// Append the shadow's event to the send list unless already queued
    pub(crate) fn queue(&mut self, shadow: &ShadowEvent<E>) -> bool {
        if !self.queued.insert(shadow.hash()) {
            return false;
        }
        self.send_list.push(Arc::clone(shadow.event()));
        true
    }

    pub(crate) fn send_list_mut(&mut self) -> &mut Vec<Arc<E>> {
        &mut self.send_list
    }
}

impl<E> fmt::Debug for SyncSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSession")
            .field("connection", &self.sync_log_label())
            .field("phase", &self.phase)
            .field("received_tips", &self.received_tip_hashes.len())
            .field("working_tips", &self.working_tips.len())
            .field("send_list", &self.send_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{CreatorId, DagEvent, GossipEvent};

    #[test]
    fn test_new_session() {
        let session: SyncSession<GossipEvent> = SyncSession::new("node-0", "node-1", SyncRole::Caller);
        assert_eq!(session.phase(), SyncPhase::Idle);
        assert_eq!(session.sync_log_label(), "node-0->node-1 (caller)");
        assert!(session.send_list().is_empty());
        assert!(session.sent_tip_hashes().is_none());
    }

    #[test]
    fn test_queue_is_idempotent() {
        let mut session = SyncSession::new("a", "b", SyncRole::Listener);
        let shadow = ShadowEvent::new(Arc::new(GossipEvent::genesis(CreatorId::from_index(1), vec![])));

        assert!(session.queue(&shadow));
        assert!(!session.queue(&shadow));
        assert_eq!(session.send_list().len(), 1);
        assert!(session.is_queued(&shadow.hash()));
    }

    #[test]
    fn test_marks_overwrite() {
        let mut session: SyncSession<GossipEvent> = SyncSession::new("a", "b", SyncRole::Caller);
        let hash = GossipEvent::genesis(CreatorId::from_index(1), vec![]).hash();

        session.mark_peer_has(hash);
        assert!(session.is_marked_peer_has(&hash));
        session.mark_search(hash);
        assert!(session.is_marked_search(&hash));
        assert!(!session.is_marked_peer_has(&hash));
    }

    #[test]
    fn test_require_phase() {
        let session: SyncSession<GossipEvent> = SyncSession::new("a", "b", SyncRole::Caller);
        assert!(session.require_phase(SyncPhase::Idle).is_ok());
        assert_eq!(
            session.require_phase(SyncPhase::BooleansExchanged),
            Err(SyncError::PhaseOrder {
                expected: SyncPhase::BooleansExchanged,
                found: SyncPhase::Idle,
            })
        );
    }

    #[test]
    fn test_tips_sent_once() {
        let mut session: SyncSession<GossipEvent> = SyncSession::new("a", "b", SyncRole::Caller);
        session.record_sent_tips(vec![]).unwrap();
        assert!(matches!(
            session.record_sent_tips(vec![]),
            Err(SyncError::SessionReused(_))
        ));
    }
}
