//! Multi-node gossip simulation
//!
//! Runs one gossip task and one expiration task per node on the tokio
//! runtime, all sharing the nodes' shadow graph managers. After the gossip
//! rounds finish, expiration stops, every node is brought to the same
//! watermark and a settle pass syncs every pair so the report can check
//! that the tip sets converged.

use crate::config::NodeConfig;
use crate::node::{NodeStats, SkeinNode};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use skein_core::{CreatorId, EventHash, Generation};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-node summary at the end of a run
#[derive(Clone, Debug, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub shadow_events: usize,
    pub tips: usize,
    pub expired_generation: Generation,
    pub max_generation: Option<Generation>,
    pub stats: NodeStats,
}

/// Outcome of a simulation run
#[derive(Clone, Debug, Serialize)]
pub struct SimulationReport {
    pub nodes: Vec<NodeReport>,
    /// Every node ended with the same tip set
    pub converged: bool,
    /// Settle passes needed to converge
    pub settle_passes: usize,
    pub elapsed_ms: u64,
}

const MAX_SETTLE_PASSES: usize = 3;

/// A set of nodes gossiping with each other
pub struct Simulation {
    config: NodeConfig,
    nodes: Vec<Arc<SkeinNode>>,
}

impl Simulation {
    /// Build the nodes described by `config`
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let nodes = (0..config.node.nodes)
            .map(|i| {
                Arc::new(SkeinNode::new(
                    format!("{}-{}", config.node.name, i),
                    CreatorId::from_index(i as u64),
                    config.gossip.max_send_batch,
                ))
            })
            .collect();
        Ok(Self { config, nodes })
    }

    pub fn nodes(&self) -> &[Arc<SkeinNode>] {
        &self.nodes
    }

    /// Run the gossip rounds, settle, and report
    pub async fn run(&self) -> anyhow::Result<SimulationReport> {
        let start = Instant::now();
        info!(
            "Starting simulation: {} nodes, {} rounds every {}ms",
            self.nodes.len(),
            self.config.gossip.rounds,
            self.config.gossip.interval_ms
        );

        let mut expirers = Vec::new();
        if self.config.expiration.enabled {
            for node in &self.nodes {
                expirers.push(self.spawn_expirer(Arc::clone(node)));
            }
        }

        let gossipers: Vec<JoinHandle<anyhow::Result<()>>> = (0..self.nodes.len())
            .map(|index| self.spawn_gossiper(index))
            .collect();

        for result in futures::future::join_all(gossipers).await {
            result??;
        }

        for (shutdown_tx, handle) in expirers {
            let _ = shutdown_tx.send(()).await;
            handle.await?;
        }

        let settle_passes = self.settle()?;
        let converged = self.tips_converged();
        if !converged {
            warn!("Tip sets still differ after {} settle passes", settle_passes);
        }

        let report = SimulationReport {
            nodes: self.nodes.iter().map(|node| node_report(node)).collect(),
            converged,
            settle_passes,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Simulation finished in {}ms (converged: {})",
            report.elapsed_ms, report.converged
        );
        Ok(report)
    }

    fn spawn_gossiper(&self, index: usize) -> JoinHandle<anyhow::Result<()>> {
        let nodes = self.nodes.clone();
        let gossip = self.config.gossip.clone();
        let seed = gossip.seed.wrapping_add(index as u64);

        tokio::spawn(async move {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let node = &nodes[index];
            let interval = gossip.interval();

            for round in 0..gossip.rounds {
                for _ in 0..gossip.events_per_round {
                    let other_parent = node.choose_other_parent(&mut rng);
                    let payload = format!("{}:{}", node.name(), round).into_bytes();
                    node.create_event(other_parent, vec![payload])?;
                }

                if nodes.len() > 1 {
                    let offset = rng.gen_range(1..nodes.len());
                    let peer = &nodes[(index + offset) % nodes.len()];
                    let outcome = node.sync_with(peer)?;
                    debug!(
                        "{} round {}: synced with {} (sent {}, received {})",
                        node.name(),
                        round,
                        peer.name(),
                        outcome.sent,
                        outcome.received
                    );
                }

                tokio::time::sleep(interval).await;
            }
            Ok::<(), anyhow::Error>(())
        })
    }

    fn spawn_expirer(&self, node: Arc<SkeinNode>) -> (mpsc::Sender<()>, JoinHandle<()>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let expiration = self.config.expiration.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(expiration.interval());
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("{}: expiration task shutting down", node.name());
                        break;
                    }
                    _ = ticker.tick() => {
                        node.expire_retaining(expiration.retained_generations);
                    }
                }
            }
        });

        (shutdown_tx, handle)
    }

    /// Align watermarks, then sync every pair until the tip sets agree
    fn settle(&self) -> anyhow::Result<usize> {
        let watermark = self
            .nodes
            .iter()
            .map(|node| node.manager().expired_generation())
            .max();
        if let Some(watermark) = watermark {
            for node in &self.nodes {
                if node.manager().expired_generation() < watermark {
                    node.manager().expire_to(watermark);
                }
            }
        }

        let mut passes = 0;
        while passes < MAX_SETTLE_PASSES && !self.tips_converged() {
            for i in 0..self.nodes.len() {
                for j in (i + 1)..self.nodes.len() {
                    self.nodes[i].sync_with(&self.nodes[j])?;
                }
            }
            passes += 1;
        }
        Ok(passes)
    }

    /// True when every node reports the same tip set
    pub fn tips_converged(&self) -> bool {
        let mut tip_sets = self.nodes.iter().map(|node| sorted_tips(node));
        let Some(first) = tip_sets.next() else {
            return true;
        };
        tip_sets.all(|tips| tips == first)
    }
}

fn sorted_tips(node: &SkeinNode) -> Vec<EventHash> {
    let mut tips = node.manager().tip_hashes();
    tips.sort();
    tips
}

fn node_report(node: &SkeinNode) -> NodeReport {
    let manager = node.manager();
    NodeReport {
        name: node.name().to_string(),
        shadow_events: manager.num_shadow_events(),
        tips: manager.num_tips(),
        expired_generation: manager.expired_generation(),
        max_generation: manager.max_generation(),
        stats: node.stats(),
    }
}
