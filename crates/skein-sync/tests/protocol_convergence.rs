//! Integration tests for the three-phase exchange
//!
//! These tests grow random hashgraphs on several simulated nodes and check
//! that one full exchange leaves both sides with each other's events.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skein_core::{CreatorId, DagEvent, EventHash, GossipEvent};
use skein_sync::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

/// A simulated member holding its own shadow graph
struct TestNode {
    name: String,
    creator: CreatorId,
    manager: ShadowGraphManager<GossipEvent>,
    last_own: Option<Arc<GossipEvent>>,
    clock: i64,
}

impl TestNode {
    fn new(index: u64) -> Self {
        Self {
            name: format!("node-{}", index),
            creator: CreatorId::from_index(index),
            manager: ShadowGraphManager::new(),
            last_own: None,
            clock: 0,
        }
    }

    /// Create an event on top of our last one, other-parented on a random tip
    fn create_event(&mut self, rng: &mut ChaCha8Rng) -> Arc<GossipEvent> {
        self.clock += 1;
        let mut builder = GossipEvent::builder(self.creator).timestamp(self.clock);
        if let Some(last) = &self.last_own {
            builder = builder.self_parent(last.descriptor());
        }

        let own = self.last_own.as_ref().map(|e| e.hash());
        let candidates: Vec<EventHash> = self
            .manager
            .tip_hashes()
            .into_iter()
            .filter(|h| Some(*h) != own)
            .collect();
        if !candidates.is_empty() {
            let pick = candidates[rng.gen_range(0..candidates.len())];
            let other = self.manager.event(&pick).unwrap();
            builder = builder.other_parent(other.descriptor());
        }

        let event = Arc::new(builder.build().unwrap());
        assert_eq!(self.manager.add_event(event.clone()), InsertableStatus::Insertable);
        self.last_own = Some(event.clone());
        event
    }

    fn num_events(&self) -> usize {
        self.manager.num_shadow_events()
    }

    fn hashes(&self) -> HashSet<EventHash> {
        self.manager.inspect(|graph| graph.hashes().copied().collect())
    }
}

/// Drive both sides of one exchange and return (caller's list, listener's list)
fn exchange(caller: &TestNode, listener: &TestNode) -> (Vec<Arc<GossipEvent>>, Vec<Arc<GossipEvent>>) {
    let mut c = SyncSession::new(caller.name.clone(), listener.name.clone(), SyncRole::Caller);
    let mut l = SyncSession::new(listener.name.clone(), caller.name.clone(), SyncRole::Listener);

    // Phase 1
    let c_tips = caller.manager.send_tip_hashes(&mut c).unwrap();
    let l_tips = listener.manager.send_tip_hashes(&mut l).unwrap();
    caller.manager.set_received_tip_hashes(&mut c, l_tips).unwrap();
    listener.manager.set_received_tip_hashes(&mut l, c_tips).unwrap();

    // Phase 2
    let c_bools = caller.manager.send_tip_booleans(&c).unwrap();
    let l_bools = listener.manager.send_tip_booleans(&l).unwrap();
    caller.manager.set_received_tip_booleans(&mut c, &l_bools).unwrap();
    listener.manager.set_received_tip_booleans(&mut l, &c_bools).unwrap();

    // Phase 3
    let c_list = caller.manager.finish_send_list(&mut c).unwrap();
    let l_list = listener.manager.finish_send_list(&mut l).unwrap();
    (c_list, l_list)
}

fn apply(node: &TestNode, events: &[Arc<GossipEvent>]) {
    for event in events {
        let status = node.manager.add_event(event.clone());
        assert!(
            status == InsertableStatus::Insertable || status == InsertableStatus::DuplicateShadowEvent,
            "{} rejected {}: {}",
            node.name,
            event.hash(),
            status
        );
    }
}

/// Insert a send list that must contain only events the node lacks
fn apply_strict(node: &TestNode, events: &[Arc<GossipEvent>]) {
    for event in events {
        assert_eq!(
            node.manager.add_event(event.clone()),
            InsertableStatus::Insertable,
            "{} was sent {} it cannot take",
            node.name,
            event.hash()
        );
    }
}

fn sync_pair(nodes: &mut [TestNode], a: usize, b: usize) {
    let (to_b, to_a) = exchange(&nodes[a], &nodes[b]);
    apply(&nodes[b], &to_b);
    apply(&nodes[a], &to_a);
}

mod convergence_tests {
    use super::*;

    #[test]
    fn test_single_exchange_converges() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut nodes: Vec<TestNode> = (0..4).map(TestNode::new).collect();

        for round in 0..40 {
            let creator = rng.gen_range(0..nodes.len());
            nodes[creator].create_event(&mut rng);

            let a = rng.gen_range(0..nodes.len());
            let b = (a + 1 + rng.gen_range(0..nodes.len() - 1)) % nodes.len();

            let before_a = nodes[a].hashes();
            let before_b = nodes[b].hashes();
            sync_pair(&mut nodes, a, b);

            let after_a = nodes[a].hashes();
            let after_b = nodes[b].hashes();
            assert!(before_b.is_subset(&after_a), "round {}: {} missing events", round, nodes[a].name);
            assert!(before_a.is_subset(&after_b), "round {}: {} missing events", round, nodes[b].name);
            assert_eq!(after_a, after_b);
        }

        for node in &nodes {
            node.manager.check_consistency().unwrap();
        }
    }

    #[test]
    fn test_send_list_is_generation_ordered_and_unique() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut nodes: Vec<TestNode> = (0..3).map(TestNode::new).collect();

        // Let node 0 run ahead while the others stay silent
        for _ in 0..6 {
            nodes[0].create_event(&mut rng);
            nodes[1].create_event(&mut rng);
            sync_pair(&mut nodes, 0, 1);
        }
        nodes[2].create_event(&mut rng);

        let (to_two, _) = exchange(&nodes[0], &nodes[2]);
        assert!(!to_two.is_empty());

        let generations: Vec<i64> = to_two.iter().map(|e| e.generation()).collect();
        let mut sorted = generations.clone();
        sorted.sort();
        assert_eq!(generations, sorted);

        let unique: HashSet<EventHash> = to_two.iter().map(|e| e.hash()).collect();
        assert_eq!(unique.len(), to_two.len());
    }

    #[test]
    fn test_nothing_sent_between_identical_nodes() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut nodes: Vec<TestNode> = (0..2).map(TestNode::new).collect();
        for _ in 0..5 {
            nodes[0].create_event(&mut rng);
            nodes[1].create_event(&mut rng);
            sync_pair(&mut nodes, 0, 1);
        }

        let (to_b, to_a) = exchange(&nodes[0], &nodes[1]);
        assert!(to_b.is_empty());
        assert!(to_a.is_empty());
    }

    #[test]
    fn test_sync_against_empty_peer_sends_everything() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut nodes: Vec<TestNode> = (0..3).map(TestNode::new).collect();
        for _ in 0..4 {
            nodes[0].create_event(&mut rng);
            nodes[1].create_event(&mut rng);
            sync_pair(&mut nodes, 0, 1);
        }

        let expected = nodes[0].num_events();
        let (to_empty, from_empty) = exchange(&nodes[0], &nodes[2]);
        assert_eq!(to_empty.len(), expected);
        assert!(from_empty.is_empty());

        apply(&nodes[2], &to_empty);
        assert_eq!(nodes[2].hashes(), nodes[0].hashes());
        nodes[2].manager.check_consistency().unwrap();
    }
}

mod minimality_tests {
    use super::*;

    /// Every event `node` holds, parents before children
    fn generation_ordered(node: &TestNode) -> Vec<Arc<GossipEvent>> {
        let mut events: Vec<Arc<GossipEvent>> =
            node.manager.inspect(|graph| graph.iter().map(|s| s.event().clone()).collect());
        events.sort_by_key(|e| (e.generation(), e.hash()));
        events
    }

    #[test]
    fn test_send_list_is_exactly_the_missing_events() {
        for seed in 0..25u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut nodes: Vec<TestNode> = (0..4).map(TestNode::new).collect();

            for _ in 0..30 {
                let creator = rng.gen_range(0..nodes.len());
                nodes[creator].create_event(&mut rng);
                let a = rng.gen_range(0..nodes.len());
                let b = (a + 1 + rng.gen_range(0..nodes.len() - 1)) % nodes.len();
                sync_pair(&mut nodes, a, b);
            }

            // A generation-ordered prefix is closed under ancestry
            let full = &nodes[0];
            let events = generation_ordered(full);
            let cut = rng.gen_range(0..=events.len());
            let behind = TestNode::new(9);
            apply_strict(&behind, &events[..cut]);

            let (to_behind, to_full) = exchange(full, &behind);
            assert!(to_full.is_empty(), "seed {}: peer sent events back", seed);

            let sent: HashSet<EventHash> = to_behind.iter().map(|e| e.hash()).collect();
            assert_eq!(sent.len(), to_behind.len(), "seed {}: duplicate in send list", seed);
            let missing: HashSet<EventHash> = full.hashes().difference(&behind.hashes()).copied().collect();
            assert_eq!(sent, missing, "seed {}: cut {} of {}", seed, cut, events.len());

            apply_strict(&behind, &to_behind);
            assert_eq!(behind.hashes(), full.hashes());
            behind.manager.check_consistency().unwrap();
        }
    }
}

mod session_tests {
    use super::*;

    #[test]
    fn test_session_reaches_finished() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut nodes: Vec<TestNode> = (0..2).map(TestNode::new).collect();
        nodes[0].create_event(&mut rng);

        let manager = &nodes[0].manager;
        let mut session = SyncSession::new("node-0", "node-1", SyncRole::Caller);
        manager.send_tip_hashes(&mut session).unwrap();
        manager.set_received_tip_hashes(&mut session, vec![]).unwrap();
        assert_eq!(session.phase(), SyncPhase::TipsExchanged);
        manager.set_received_tip_booleans(&mut session, &[false]).unwrap();
        assert_eq!(session.phase(), SyncPhase::BooleansExchanged);
        manager.finish_send_list(&mut session).unwrap();
        assert_eq!(session.phase(), SyncPhase::Finished);

        // A finished session cannot be driven again
        let err = manager.finish_send_list(&mut session).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_abandoned_session_leaves_graph_untouched() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut nodes: Vec<TestNode> = (0..1).map(TestNode::new).collect();
        for _ in 0..3 {
            nodes[0].create_event(&mut rng);
        }
        let before = nodes[0].hashes();

        {
            let mut session = SyncSession::new("node-0", "gone", SyncRole::Listener);
            nodes[0].manager.send_tip_hashes(&mut session).unwrap();
            nodes[0]
                .manager
                .set_received_tip_hashes(&mut session, vec![])
                .unwrap();
        }

        assert_eq!(nodes[0].hashes(), before);
        assert_eq!(nodes[0].manager.num_tips(), 1);
    }
}
