//! # Skein Sync
//!
//! Shadow graph and the three-phase gossip exchange:
//! - `ShadowGraph` - hash-indexed DAG mirroring the hashgraph's events
//! - `ShadowGraphManager` - event intake, tips, expiration and the exchange
//! - `SyncSession` - per-peer, per-run exchange state
//!
//! ## Flow
//!
//! ```text
//!   consensus ──add_event──►┌──────────────────────┐◄──expire── consensus
//!                           │  ShadowGraphManager  │
//!                           │  graph · tips · gen  │
//!                           └──────────┬───────────┘
//!                                      │ phases 1, 2, 3
//!                           ┌──────────▼───────────┐
//!                 peer ◄───►│     SyncSession      │───► send list
//!                           └──────────────────────┘
//! ```
//!
//! The manager only computes what to send. Transport, acceptance of the
//! received events and the choice of watermark belong to the caller.

pub mod error;
pub mod graph;
pub mod insertable;
pub mod manager;
pub mod session;
pub mod shadow;

pub use error::{Result, SyncError};
pub use graph::ShadowGraph;
pub use insertable::InsertableStatus;
pub use manager::ShadowGraphManager;
pub use session::{SyncMark, SyncPhase, SyncRole, SyncSession};
pub use shadow::ShadowEvent;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Result, SyncError};
    pub use crate::graph::ShadowGraph;
    pub use crate::insertable::InsertableStatus;
    pub use crate::manager::ShadowGraphManager;
    pub use crate::session::{SyncMark, SyncPhase, SyncRole, SyncSession};
    pub use crate::shadow::ShadowEvent;
}
