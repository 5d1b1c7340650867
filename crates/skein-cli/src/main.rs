//! Skein CLI
//!
//! Command-line interface for running gossip simulations over the shadow graph.

use clap::{Parser, Subcommand};
use skein_node::{LoggingConfig, NodeConfig, Simulation};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "skein")]
#[command(version)]
#[command(about = "Skein - hashgraph shadow graph and gossip sync simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a multi-node gossip simulation
    Simulate {
        /// Configuration file path
        #[arg(short, long, default_value = "skein.toml")]
        config: PathBuf,

        /// Override the number of nodes
        #[arg(short, long)]
        nodes: Option<usize>,

        /// Override the number of gossip rounds
        #[arg(short, long)]
        rounds: Option<u64>,

        /// Override the random seed
        #[arg(long, env = "SKEIN_SEED")]
        seed: Option<u64>,

        /// Disable periodic expiration
        #[arg(long)]
        no_expire: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print or write the default configuration
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Version information
    Version,
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json = logging.is_json();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
        }))
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<NodeConfig> {
    if path.exists() {
        NodeConfig::load(path)
    } else {
        Ok(NodeConfig::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            nodes,
            rounds,
            seed,
            no_expire,
            json,
        } => {
            let mut node_config = load_config(&config)?;
            init_logging(cli.verbose, &node_config.logging);
            if !config.exists() {
                tracing::info!("Config {:?} not found, using defaults", config);
            }

            if let Some(nodes) = nodes {
                node_config.node.nodes = nodes;
            }
            if let Some(rounds) = rounds {
                node_config.gossip.rounds = rounds;
            }
            if let Some(seed) = seed {
                node_config.gossip.seed = seed;
            }
            if no_expire {
                node_config.expiration.enabled = false;
            }

            let simulation = Simulation::new(node_config)?;
            let report = simulation.run().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{:<12} {:>8} {:>6} {:>10} {:>9} {:>9} {:>9}",
                    "node", "shadows", "tips", "expired", "created", "accepted", "rejected"
                );
                for node in &report.nodes {
                    let expired = if node.expired_generation == i64::MIN {
                        "-".to_string()
                    } else {
                        node.expired_generation.to_string()
                    };
                    println!(
                        "{:<12} {:>8} {:>6} {:>10} {:>9} {:>9} {:>9}",
                        node.name,
                        node.shadow_events,
                        node.tips,
                        expired,
                        node.stats.events_created,
                        node.stats.events_accepted,
                        node.stats.events_rejected
                    );
                }
                println!();
                println!(
                    "converged: {} (settle passes: {}, {}ms)",
                    report.converged, report.settle_passes, report.elapsed_ms
                );
            }

            if !report.converged {
                anyhow::bail!("nodes did not converge");
            }
        }

        Commands::Config { output, force } => {
            let rendered = NodeConfig::default().to_toml()?;
            match output {
                Some(path) => {
                    if path.exists() && !force {
                        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
                    }
                    std::fs::write(&path, rendered)?;
                    println!("Wrote default configuration to {:?}", path);
                }
                None => print!("{}", rendered),
            }
        }

        Commands::Version => {
            println!("skein {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
