//! # Skein Core
//!
//! Event-level building blocks shared by the Skein crates:
//! - `EventHash` / `Generation` - identity and causal depth of an event
//! - `EventDescriptor` - a parent reference (hash + generation)
//! - `DagEvent` - the boundary the shadow graph consumes
//! - `GossipEvent` - the concrete event nodes create and gossip
//!
//! ## Architecture
//!
//! ```text
//!      creator A          creator B
//!
//!        a3 ◄──────────┐
//!        │             │
//!        a2            b2
//!        │  ◄───────── │
//!        a1            b1
//!
//!   self-parent edges run vertically,
//!   other-parent edges cross between creators
//! ```

pub mod error;
pub mod event;
pub mod types;

pub use error::*;
pub use event::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{CoreError, Result};
    pub use crate::event::{DagEvent, GossipEvent, GossipEventBuilder};
    pub use crate::types::*;
}
