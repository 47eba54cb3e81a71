use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;
use tracing::info;

use archflow::core::{Chain, Engine};

#[derive(Parser)]
#[command(name = "archflow")]
#[command(about = "Resolve DDD facts into an architecture graph and its execution chains")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Build the graph, trace chains and write outputs
    Analyze {
        /// Fact files or directories (defaults to the configured ones)
        #[arg(short, long)]
        facts: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (json, mermaid, all)
        #[arg(long)]
        format: Option<String>,
    },

    /// Print traced chains
    Chains {
        /// Fact files or directories (defaults to the configured ones)
        #[arg(short, long)]
        facts: Vec<PathBuf>,

        /// Trace only from this node id
        #[arg(short, long)]
        entry: Option<String>,
    },

    /// Print graph statistics
    Stats {
        /// Fact files or directories (defaults to the configured ones)
        #[arg(short, long)]
        facts: Vec<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path } => {
                let written = engine.init(path).await?;
                println!("{}", written.display());
                Ok(())
            }
            Commands::Analyze { facts, output, format } => {
                let written = engine.analyze(facts, output, format).await?;
                for path in written {
                    println!("{}", path.display());
                }
                Ok(())
            }
            Commands::Chains { facts, entry } => {
                let chains = engine.chains(facts, entry).await?;
                for chain in &chains {
                    print_chain(chain);
                }
                info!("{} chains", chains.len());
                Ok(())
            }
            Commands::Stats { facts } => {
                let (stats, build) = engine.stats(facts).await?;
                println!("Batches:          {}", build.reports.len());
                println!("Nodes:            {}", stats.total_nodes);
                println!("Relationships:    {}", stats.total_relationships);
                println!("Owned entities:   {}", stats.owned_entities);
                println!("Malformed facts:  {}", build.malformed_facts());
                println!("Discarded calls:  {}", build.discarded_calls());
                for (kind, count) in &stats.relationships_by_kind {
                    println!("  {:<32} {}", kind.to_string(), count);
                }
                Ok(())
            }
        }
    }
}

fn print_chain(chain: &Chain) {
    println!("{}", chain.name);
    for edge in &chain.edges {
        let name = |local: &str| {
            chain
                .nodes
                .iter()
                .find(|n| n.local_id == local)
                .map_or(local.to_string(), |n| n.node_id.clone())
        };
        println!("  {} -[{}]-> {}", name(&edge.from), edge.label, name(&edge.to));
    }
}
