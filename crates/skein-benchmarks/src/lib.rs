//! # Skein Benchmarks
//!
//! Fixtures shared by the criterion benches: deterministic gossip DAGs and
//! helpers that drive the three-phase exchange end to end.
//!
//! ## Usage
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench --package skein-benchmarks
//!
//! # Run one group
//! cargo bench --package skein-benchmarks -- sync
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skein_core::{CreatorId, DagEvent, GossipEvent};
use skein_sync::{ShadowGraphManager, SyncError, SyncRole, SyncSession};
use std::sync::Arc;

// ============================================================================
// DAG FIXTURES
// ============================================================================

/// Build a gossip DAG of `events` events spread over `creators` creators
///
/// Events are returned in a valid insertion order: every event follows both
/// of its parents. Each event takes a random other creator's latest event as
/// its other-parent.
pub fn build_dag(creators: usize, events: usize, seed: u64) -> Vec<Arc<GossipEvent>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut latest: Vec<Option<Arc<GossipEvent>>> = vec![None; creators.max(1)];
    let mut dag = Vec::with_capacity(events);

    for i in 0..events {
        let creator = rng.gen_range(0..latest.len());
        let mut builder = GossipEvent::builder(CreatorId::from_index(creator as u64)).timestamp(i as i64);

        if let Some(parent) = &latest[creator] {
            builder = builder.self_parent(parent.descriptor());
        }
        if latest.len() > 1 {
            let other = (creator + rng.gen_range(1..latest.len())) % latest.len();
            if let Some(parent) = &latest[other] {
                builder = builder.other_parent(parent.descriptor());
            }
        }

        // Parents are distinct creators' events, so build cannot fail
        if let Ok(event) = builder.build() {
            let event = Arc::new(event);
            latest[creator] = Some(Arc::clone(&event));
            dag.push(event);
        }
    }

    dag
}

/// Insert `events` into a fresh manager
pub fn populate(events: &[Arc<GossipEvent>]) -> ShadowGraphManager<GossipEvent> {
    let manager = ShadowGraphManager::new();
    for event in events {
        manager.add_event(Arc::clone(event));
    }
    manager
}

/// Run a full exchange and return the caller's send list
pub fn exchange(
    caller: &ShadowGraphManager<GossipEvent>,
    listener: &ShadowGraphManager<GossipEvent>,
) -> Result<Vec<Arc<GossipEvent>>, SyncError> {
    let mut c = SyncSession::new("caller", "listener", SyncRole::Caller);
    let mut l = SyncSession::new("listener", "caller", SyncRole::Listener);

    let c_tips = caller.send_tip_hashes(&mut c)?;
    let l_tips = listener.send_tip_hashes(&mut l)?;
    caller.set_received_tip_hashes(&mut c, l_tips)?;
    listener.set_received_tip_hashes(&mut l, c_tips)?;

    let c_bools = caller.send_tip_booleans(&c)?;
    let l_bools = listener.send_tip_booleans(&l)?;
    caller.set_received_tip_booleans(&mut c, &l_bools)?;
    listener.set_received_tip_booleans(&mut l, &c_bools)?;

    caller.finish_send_list(&mut c)
}
