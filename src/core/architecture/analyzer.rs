// src/core/architecture/analyzer.rs
use std::collections::{BTreeMap, HashMap};
use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use super::super::facts::{Contract, FactBatch, Node, NodeKind, TypeFact, TypeKind};
use super::classifier::{Relationship, RelationshipClassifier};
use super::ownership::{OwnershipFact, OwnershipResolver};
use super::propagation::{EventPropagator, MethodCallGraph};

/// Counters for facts that did not make it into the graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Calls and contracts naming unknown type ids
    pub malformed_facts: usize,
    /// Well-formed calls outside the relationship taxonomy
    pub discarded_calls: usize,
    /// Entities with no owning aggregate
    pub unresolved_entities: Vec<String>,
}

/// Everything one fact batch contributes to the graph store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDelta {
    pub source: String,
    pub fingerprint: String,
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
    pub ownership: Vec<OwnershipFact>,
    pub diagnostics: Diagnostics,
}

/// Pure `FactBatch -> GraphDelta` step: ownership, event propagation, then
/// classification, plus the nodes every relationship endpoint needs.
pub struct ArchitectureAnalyzer {
    ownership_resolver: OwnershipResolver,
    event_propagator: EventPropagator,
}

impl ArchitectureAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            ownership_resolver: OwnershipResolver::new(config.ownership_suffixes.clone()),
            event_propagator: EventPropagator::new(config.merge_same_name_events),
        }
    }

    pub fn analyze(&self, batch: &FactBatch) -> GraphDelta {
        debug!("Analyzing batch {} ({} types, {} calls)", batch.source, batch.types.len(), batch.calls.len());

        let aggregates = batch.types_of(TypeKind::Aggregate);
        let entities = batch.types_of(TypeKind::Entity);
        let ownership = self
            .ownership_resolver
            .resolve(&aggregates, &entities, &batch.containment_facts());

        let call_graph = MethodCallGraph::from_edges(&batch.calls);
        let events = self.event_propagator.propagate(&call_graph);

        let classification = RelationshipClassifier::new(&batch.types, &ownership)
            .classify(&batch.calls, &events);

        let mut nodes = declared_nodes(batch);
        let index = batch.type_index();
        for relationship in &classification.relationships {
            for (type_id, method) in [
                (&relationship.from_id, &relationship.from_method),
                (&relationship.to_id, &relationship.to_method),
            ] {
                if let Some(node) = endpoint_node(&index, type_id, method) {
                    nodes.entry(node.id.clone()).or_insert(node);
                }
            }
        }

        let diagnostics = Diagnostics {
            malformed_facts: classification.malformed,
            discarded_calls: classification.discarded,
            unresolved_entities: ownership.unresolved().to_vec(),
        };

        if diagnostics.malformed_facts > 0 {
            warn!(
                "Batch {}: dropped {} facts referencing unknown types",
                batch.source, diagnostics.malformed_facts
            );
        }

        info!(
            "Batch {}: {} nodes, {} relationships, {} owned entities",
            batch.source,
            nodes.len(),
            classification.relationships.len(),
            ownership.len()
        );

        GraphDelta {
            source: batch.source.clone(),
            fingerprint: batch.fingerprint(),
            nodes: nodes.into_values().collect(),
            relationships: classification.relationships.into_iter().collect(),
            ownership: ownership.facts(),
            diagnostics,
        }
    }
}

impl Default for ArchitectureAnalyzer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

/// Type nodes, declared method nodes and converter nodes
fn declared_nodes(batch: &FactBatch) -> BTreeMap<String, Node> {
    let mut nodes = BTreeMap::new();

    for fact in &batch.types {
        let Some(kind) = fact.kind.node_kind() else {
            continue;
        };

        if kind == NodeKind::IntegrationEventConverter {
            for contract in &fact.contracts {
                if let Contract::ConvertsEvent { domain_event, integration_event } = contract {
                    let id = Node::converter_id(domain_event, integration_event);
                    nodes.entry(id.clone()).or_insert_with(|| Node::new(id, &fact.name, kind));
                }
            }
            continue;
        }

        nodes
            .entry(fact.id.clone())
            .or_insert_with(|| Node::new(&fact.id, &fact.name, kind));

        if let Some(method_kind) = kind.method_kind() {
            for method in &fact.methods {
                let id = Node::method_id(&fact.id, method);
                nodes
                    .entry(id.clone())
                    .or_insert_with(|| Node::new(id, method, method_kind));
            }
        }
    }

    nodes
}

/// Method-level node for an endpoint on a method-bearing type
fn endpoint_node(index: &HashMap<&str, &TypeFact>, type_id: &str, method: &str) -> Option<Node> {
    if method.is_empty() {
        return None;
    }
    let method_kind = index.get(type_id)?.kind.node_kind()?.method_kind()?;
    Some(Node::new(Node::method_id(type_id, method), method, method_kind))
}
