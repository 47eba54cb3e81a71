// src/core/exporter.rs
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::info;

use crate::error::{ArchflowError, Result};
use super::architecture::{Chain, GraphStats, GraphStore, Relationship};
use super::facts::Node;

const MERMAID_TEMPLATE: &str = r#"# {{ project }} execution chains
{% if metadata %}
Generated: {{ metadata.generated_at }}
Graph fingerprint: `{{ metadata.fingerprint }}`
{% endif %}
{% for chain in chains %}
## {{ chain.title }}

```mermaid
flowchart LR
{% for node in chain.nodes %}    {{ node.local_id }}["{{ node.label }}"]:::{{ node.class }}
{% endfor %}{% for edge in chain.edges %}    {{ edge.from }} -->|{{ edge.label }}| {{ edge.to }}
{% endfor %}{{ class_defs }}```
{% endfor %}"#;

const CLASS_DEFS: &str = "    classDef controller fill:#e3f2fd,stroke:#1565c0\n\
    classDef endpoint fill:#e3f2fd,stroke:#1565c0\n\
    classDef sender fill:#e3f2fd,stroke:#1565c0\n\
    classDef command fill:#fff3e0,stroke:#ef6c00\n\
    classDef aggregate fill:#e8f5e9,stroke:#2e7d32\n\
    classDef entity fill:#f1f8e9,stroke:#558b2f\n\
    classDef domainEvent fill:#fce4ec,stroke:#ad1457\n\
    classDef integrationEvent fill:#f3e5f5,stroke:#6a1b9a\n\
    classDef domainHandler fill:#ede7f6,stroke:#4527a0\n\
    classDef integrationHandler fill:#ede7f6,stroke:#4527a0\n\
    classDef converter fill:#eceff1,stroke:#37474f\n\
    classDef unknown fill:#ffffff,stroke:#9e9e9e\n";

#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub project: String,
    pub generated_at: DateTime<Utc>,
    pub fingerprint: String,
}

#[derive(Serialize)]
struct GraphExport<'a> {
    metadata: Option<ExportMetadata>,
    stats: GraphStats,
    nodes: Vec<&'a Node>,
    relationships: Vec<&'a Relationship>,
    ownership: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ChainsExport<'a> {
    metadata: Option<ExportMetadata>,
    chains: &'a [Chain],
}

#[derive(Serialize)]
struct MermaidNode {
    local_id: String,
    label: String,
    class: &'static str,
}

#[derive(Serialize)]
struct MermaidEdge {
    from: String,
    to: String,
    label: &'static str,
}

#[derive(Serialize)]
struct MermaidChain {
    title: String,
    nodes: Vec<MermaidNode>,
    edges: Vec<MermaidEdge>,
}

/// Serializes the finished graph and its chains for renderers
pub struct Exporter {
    project: String,
    include_metadata: bool,
}

impl Exporter {
    pub fn new(project: impl Into<String>, include_metadata: bool) -> Self {
        Self {
            project: project.into(),
            include_metadata,
        }
    }

    pub fn graph_json(&self, store: &GraphStore) -> Result<String> {
        let export = GraphExport {
            metadata: self.metadata(store)?,
            stats: store.stats(),
            nodes: store.nodes().collect(),
            relationships: store.relationships().collect(),
            ownership: store.ownership(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    pub fn chains_json(&self, store: &GraphStore, chains: &[Chain]) -> Result<String> {
        let export = ChainsExport {
            metadata: self.metadata(store)?,
            chains,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Markdown document with one Mermaid flowchart per chain
    pub fn mermaid(&self, store: &GraphStore, chains: &[Chain]) -> Result<String> {
        let sanitizer = Regex::new(r#"["<>{}|\[\]]"#)?;
        let clean = |text: &str| sanitizer.replace_all(text, "_").into_owned();

        let diagrams: Vec<MermaidChain> = chains
            .iter()
            .map(|chain| MermaidChain {
                title: chain.name.clone(),
                nodes: chain
                    .nodes
                    .iter()
                    .map(|node| MermaidNode {
                        local_id: node.local_id.clone(),
                        label: clean(&node.node_id),
                        class: node.kind.map(|k| k.css_class()).unwrap_or("unknown"),
                    })
                    .collect(),
                edges: chain
                    .edges
                    .iter()
                    .map(|edge| MermaidEdge {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        label: edge.label.as_str(),
                    })
                    .collect(),
            })
            .collect();

        let mut context = Context::new();
        context.insert("project", &self.project);
        context.insert("metadata", &self.metadata(store)?);
        context.insert("chains", &diagrams);
        context.insert("class_defs", CLASS_DEFS);

        Ok(Tera::one_off(MERMAID_TEMPLATE, &context, false)?)
    }

    /// Write the requested formats (`json`, `mermaid`, `all`) into `output_dir`
    pub async fn write_all(
        &self,
        store: &GraphStore,
        chains: &[Chain],
        output_dir: &Path,
        formats: &[String],
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(output_dir).await?;
        let mut written = Vec::new();
        let (mut json, mut mermaid) = (false, false);

        for format in formats {
            match format.as_str() {
                "json" => json = true,
                "mermaid" => mermaid = true,
                "all" => (json, mermaid) = (true, true),
                other => {
                    return Err(ArchflowError::Config(format!("Unsupported output format: {}", other)));
                }
            }
        }

        if json {
            written.push(self.write(output_dir, "graph.json", self.graph_json(store)?).await?);
            written.push(self.write(output_dir, "chains.json", self.chains_json(store, chains)?).await?);
        }
        if mermaid {
            written.push(self.write(output_dir, "chains.md", self.mermaid(store, chains)?).await?);
        }

        Ok(written)
    }

    async fn write(&self, dir: &Path, name: &str, content: String) -> Result<PathBuf> {
        let path = dir.join(name);
        tokio::fs::write(&path, content).await?;
        info!("Wrote {}", path.display());
        Ok(path)
    }

    fn metadata(&self, store: &GraphStore) -> Result<Option<ExportMetadata>> {
        if !self.include_metadata {
            return Ok(None);
        }
        Ok(Some(ExportMetadata {
            project: self.project.clone(),
            generated_at: Utc::now(),
            fingerprint: store.fingerprint()?,
        }))
    }
}
