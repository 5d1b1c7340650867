//! Error types for shadow graph and sync session operations
//!
//! Rejecting an event at intake is not an error; see
//! [`InsertableStatus`](crate::InsertableStatus). The variants here are
//! contract violations by the caller or detected invariant breaks.

use crate::session::SyncPhase;
use skein_core::EventHash;
use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the shadow graph, its manager and sync sessions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    // === Shadow Graph ===
    /// A shadow already exists for this event
    #[error("Shadow event already exists: {0}")]
    DuplicateShadow(EventHash),

    // === Protocol ===
    /// Phase 2 booleans do not line up with the tips sent in phase 1
    #[error("Tip boolean count mismatch: sent {expected} tips, received {received} booleans")]
    TipCountMismatch { expected: usize, received: usize },

    /// A phase method was called out of order
    #[error("Sync phase out of order: expected {expected}, session is at {found}")]
    PhaseOrder { expected: SyncPhase, found: SyncPhase },

    /// Phase 2 booleans received before local tips were sent
    #[error("Local tip hashes were never sent on this session")]
    TipsNotSent,

    /// A session was driven through the same phase twice
    #[error("Sync session reused: {0}")]
    SessionReused(&'static str),

    // === Consistency ===
    /// A shadow's unexpired parent is missing from the graph
    #[error("Shadow {child} references missing unexpired parent {parent}")]
    DanglingParent { child: EventHash, parent: EventHash },

    /// Tip set disagrees with the shadows that have no self-children
    #[error("Tip set inconsistent at shadow {0}")]
    TipMismatch(EventHash),
}

impl SyncError {
    /// Caller misuse of the protocol, as opposed to a broken graph invariant
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::TipCountMismatch { .. }
                | Self::PhaseOrder { .. }
                | Self::TipsNotSent
                | Self::SessionReused(_)
                | Self::DuplicateShadow(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::TipCountMismatch {
            expected: 3,
            received: 2,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("sent 3 tips"));
        assert!(msg.contains("received 2 booleans"));
    }

    #[test]
    fn test_phase_order_display() {
        let err = SyncError::PhaseOrder {
            expected: SyncPhase::TipsExchanged,
            found: SyncPhase::Idle,
        };
        assert!(format!("{}", err).contains("tips-exchanged"));
    }

    #[test]
    fn test_contract_violations() {
        assert!(SyncError::TipsNotSent.is_contract_violation());
        let hash = EventHash::from_content(b"x");
        assert!(!SyncError::DanglingParent {
            child: hash,
            parent: hash
        }
        .is_contract_violation());
    }
}
