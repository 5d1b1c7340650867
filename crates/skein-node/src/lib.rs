//! # Skein Node
//!
//! Gossip node runtime over the Skein shadow graph:
//! - `SkeinNode` - creates events, syncs with peers, expires old shadows
//! - `Simulation` - several nodes gossiping on the tokio runtime
//! - `NodeConfig` - TOML configuration shared by both

pub mod config;
pub mod node;
pub mod simulation;

pub use config::{ExpirationConfig, GossipConfig, LoggingConfig, NodeConfig, NodeSettings};
pub use node::{NodeStats, SkeinNode, SyncOutcome};
pub use simulation::{NodeReport, Simulation, SimulationReport};
