// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::{info, warn, debug};

use crate::config::Config;
use super::architecture::{
    ArchitectureAnalyzer, Chain, ChainTracer, Diagnostics, GraphDelta, GraphStats, GraphStore,
};
use super::exporter::Exporter;
use super::facts::FactBatch;
use super::loader::FactLoader;

/// Diagnostics reported by one analysed batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub source: String,
    pub fingerprint: String,
    pub diagnostics: Diagnostics,
}

/// Merged graph plus what each batch dropped on the way in
#[derive(Debug, Clone, Default)]
pub struct BuildResult {
    pub store: GraphStore,
    pub reports: Vec<BatchReport>,
}

impl BuildResult {
    pub fn malformed_facts(&self) -> usize {
        self.reports.iter().map(|r| r.diagnostics.malformed_facts).sum()
    }

    pub fn discarded_calls(&self) -> usize {
        self.reports.iter().map(|r| r.diagnostics.discarded_calls).sum()
    }
}

/// Main orchestration engine: load facts, analyse batches, merge, trace, export
pub struct Engine {
    config: Config,
    analyzer: Arc<ArchitectureAnalyzer>,
    loader: FactLoader,
    tracer: ChainTracer,
    exporter: Exporter,
}

impl Engine {
    /// Create a new engine from a configuration file, or the default configuration
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        Ok(Self::with_config(config))
    }

    pub fn with_config(config: Config) -> Self {
        let analyzer = Arc::new(ArchitectureAnalyzer::new(&config.analysis));
        let exporter = Exporter::new(&config.project.name, config.output.include_metadata);

        Self {
            config,
            analyzer,
            loader: FactLoader::new(),
            tracer: ChainTracer::new(),
            exporter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write a default configuration file into `path`
    pub async fn init(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to resolve current directory")?,
        };
        info!("Initializing Archflow in: {}", target_dir.display());

        tokio::fs::create_dir_all(&target_dir).await?;
        let config_path = target_dir.join("archflow.toml");
        if config_path.exists() {
            warn!("{} already exists, leaving it untouched", config_path.display());
            return Ok(config_path);
        }

        Config::default().save(&config_path)?;
        info!("Wrote default configuration to {}", config_path.display());
        Ok(config_path)
    }

    /// Load every batch under `facts` (or the configured fact directories),
    /// analyse each one and merge the deltas in load order
    pub async fn build_store(&self, facts: &[PathBuf]) -> Result<BuildResult> {
        let paths = if facts.is_empty() {
            self.config.project.facts_dirs.clone()
        } else {
            facts.to_vec()
        };

        let batches = self.loader.load_paths(&paths).await?;
        info!("Loaded {} fact batches", batches.len());

        let deltas = self.analyze_batches(batches).await?;

        let mut result = BuildResult::default();
        for delta in deltas {
            result.reports.push(BatchReport {
                source: delta.source.clone(),
                fingerprint: delta.fingerprint.clone(),
                diagnostics: delta.diagnostics.clone(),
            });
            let outcome = result.store.merge(delta);
            debug!(
                "Merged batch: +{} nodes, +{} relationships",
                outcome.added_nodes, outcome.added_relationships
            );
        }

        result.store.check_invariants()?;

        let malformed = result.malformed_facts();
        if malformed > 0 {
            warn!("{} malformed facts were dropped across all batches", malformed);
        }
        info!(
            "Graph built: {} nodes, {} relationships",
            result.store.node_count(),
            result.store.relationship_count()
        );

        Ok(result)
    }

    /// Batches are independent, so each one is analysed on the blocking pool.
    /// Results are awaited in submission order.
    async fn analyze_batches(&self, batches: Vec<FactBatch>) -> Result<Vec<GraphDelta>> {
        if !self.config.analysis.parallel_batches {
            return Ok(batches.iter().map(|b| self.analyzer.analyze(b)).collect());
        }

        let handles: Vec<_> = batches
            .into_iter()
            .map(|batch| {
                let analyzer = Arc::clone(&self.analyzer);
                tokio::task::spawn_blocking(move || analyzer.analyze(&batch))
            })
            .collect();

        let mut deltas = Vec::with_capacity(handles.len());
        for handle in handles {
            deltas.push(handle.await.context("Batch analysis task failed")?);
        }
        Ok(deltas)
    }

    /// Build the graph, trace every chain and write the requested formats
    pub async fn analyze(
        &self,
        facts: Vec<PathBuf>,
        output: Option<PathBuf>,
        format: Option<String>,
    ) -> Result<Vec<PathBuf>> {
        let output_dir = output.unwrap_or_else(|| self.config.project.output_dir.clone());
        let formats = match format {
            Some(format) => vec![format],
            None => self.config.output.formats.clone(),
        };

        info!("Analyzing architecture facts");
        info!("Output: {}", output_dir.display());

        let build = self.build_store(&facts).await?;
        let chains = self.tracer.trace_chains(&build.store);
        info!("Traced {} chains", chains.len());

        let written = self
            .exporter
            .write_all(&build.store, &chains, &output_dir, &formats)
            .await?;
        Ok(written)
    }

    /// Every chain, or the single chain rooted at `entry`
    pub async fn chains(&self, facts: Vec<PathBuf>, entry: Option<String>) -> Result<Vec<Chain>> {
        let build = self.build_store(&facts).await?;
        match entry {
            Some(entry) => Ok(vec![self.tracer.trace_from(&build.store, &entry)?]),
            None => Ok(self.tracer.trace_chains(&build.store)),
        }
    }

    pub async fn stats(&self, facts: Vec<PathBuf>) -> Result<(GraphStats, BuildResult)> {
        let build = self.build_store(&facts).await?;
        Ok((build.store.stats(), build))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::facts::{Contract, RawCallEdge, TypeFact, TypeKind};

    fn write_batch(dir: &Path, name: &str, batch: &FactBatch) {
        std::fs::write(dir.join(name), serde_json::to_string(batch).unwrap()).unwrap();
    }

    fn split_batches(dir: &Path) {
        write_batch(
            dir,
            "01-web.json",
            &FactBatch::new("web")
                .with_type(TypeFact::new("OrderController", TypeKind::Controller))
                .with_type(TypeFact::new("PayOrder", TypeKind::Command))
                .with_call(RawCallEdge::send("OrderController", "Pay", "PayOrder")),
        );
        write_batch(
            dir,
            "02-ordering.json",
            &FactBatch::new("ordering")
                .with_type(TypeFact::new("PayOrder", TypeKind::Command))
                .with_type(
                    TypeFact::new("PayOrderHandler", TypeKind::CommandHandler)
                        .with_contract(Contract::HandlesCommand { command: "PayOrder".to_string() }),
                )
                .with_type(TypeFact::new("Order", TypeKind::Aggregate))
                .with_call(RawCallEdge::invocation("PayOrderHandler", "Handle", "Order", "MarkPaid")),
        );
    }

    #[tokio::test]
    async fn test_parallel_and_sequential_builds_agree() {
        let dir = tempfile::tempdir().unwrap();
        split_batches(dir.path());
        let facts = vec![dir.path().to_path_buf()];

        let parallel = Engine::with_config(Config::default()).build_store(&facts).await.unwrap();

        let mut config = Config::default();
        config.analysis.parallel_batches = false;
        let sequential = Engine::with_config(config).build_store(&facts).await.unwrap();

        assert_eq!(parallel.store, sequential.store);
        assert_eq!(parallel.reports.len(), 2);
        assert_eq!(parallel.reports[0].source, "web");
    }

    #[tokio::test]
    async fn test_chain_spans_batches() {
        let dir = tempfile::tempdir().unwrap();
        split_batches(dir.path());

        let chains = Engine::with_config(Config::default())
            .chains(vec![dir.path().to_path_buf()], None)
            .await
            .unwrap();

        assert_eq!(chains.len(), 1);
        let ids: Vec<&str> = chains[0].node_ids().collect();
        assert_eq!(ids, vec!["OrderController.Pay", "PayOrder", "Order.MarkPaid"]);
    }

    #[tokio::test]
    async fn test_conflicting_kinds_do_not_fail_the_build() {
        let dir = tempfile::tempdir().unwrap();
        write_batch(
            dir.path(),
            "a.json",
            &FactBatch::new("api")
                .with_type(TypeFact::new("X", TypeKind::Endpoint))
                .with_type(TypeFact::new("Go", TypeKind::Command))
                .with_call(RawCallEdge::send("X", "Post", "Go")),
        );
        write_batch(
            dir.path(),
            "b.json",
            &FactBatch::new("web").with_type(TypeFact::new("X", TypeKind::Controller)),
        );

        let build = Engine::with_config(Config::default())
            .build_store(&[dir.path().to_path_buf()])
            .await
            .unwrap();
        assert!(build.store.node("X.Post").is_some());
    }

    #[tokio::test]
    async fn test_unknown_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        split_batches(dir.path());

        let result = Engine::with_config(Config::default())
            .chains(vec![dir.path().to_path_buf()], Some("Nope".to_string()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::with_config(Config::default());

        let path = engine.init(Some(dir.path().to_path_buf())).await.unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.project.output_dir, Config::default().project.output_dir);
    }
}
