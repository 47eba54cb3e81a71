// src/core/architecture/graph_store.rs
use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};
use tracing::debug;

use crate::error::{ArchflowError, Result};
use super::super::facts::{Node, NodeKind};
use super::analyzer::GraphDelta;
use super::classifier::{Relationship, RelationshipKind};

/// Canonical node and relationship collections for one analysis run.
///
/// Nodes are keyed by id and relationships by their full identity key, so
/// merging is idempotent and commutative and iteration order never depends on
/// the order batches arrived in. The store only grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStore {
    nodes: BTreeMap<String, Node>,
    relationships: BTreeSet<Relationship>,
    /// Child entity id -> owning aggregate id
    ownership: BTreeMap<String, String>,
    merged_batches: BTreeSet<String>,
    /// Method nodes no batch declared, re-derived after every merge
    #[serde(default)]
    derived: BTreeSet<String>,
}

/// What a single merge added
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added_nodes: usize,
    pub added_relationships: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub owned_entities: usize,
    pub merged_batches: usize,
    pub nodes_by_kind: BTreeMap<NodeKind, usize>,
    pub relationships_by_kind: BTreeMap<RelationshipKind, usize>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from several deltas
    pub fn from_deltas(deltas: impl IntoIterator<Item = GraphDelta>) -> Self {
        let mut store = Self::new();
        for delta in deltas {
            store.merge(delta);
        }
        store
    }

    /// Add every node and relationship of `delta` not already present.
    ///
    /// Conflicting payloads for one node id resolve to the smaller `(kind, name)`
    /// and conflicting owners to the smaller aggregate id, whichever batch came first.
    pub fn merge(&mut self, delta: GraphDelta) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let nodes_before = self.nodes.len();

        for node in delta.nodes {
            if self.derived.remove(&node.id) {
                self.nodes.insert(node.id.clone(), node);
                continue;
            }
            match self.nodes.get_mut(&node.id) {
                Some(existing) => {
                    if (node.kind, &node.name) < (existing.kind, &existing.name) {
                        *existing = node;
                    }
                }
                None => {
                    self.nodes.insert(node.id.clone(), node);
                }
            }
        }

        for relationship in delta.relationships {
            if self.relationships.insert(relationship) {
                outcome.added_relationships += 1;
            }
        }

        for fact in delta.ownership {
            let owner = self
                .ownership
                .entry(fact.child_entity)
                .or_insert_with(|| fact.owner_aggregate.clone());
            if fact.owner_aggregate < *owner {
                *owner = fact.owner_aggregate;
            }
        }

        if !delta.fingerprint.is_empty() {
            self.merged_batches.insert(delta.fingerprint);
        }

        self.derive_method_nodes();
        outcome.added_nodes = self.nodes.len().saturating_sub(nodes_before);
        outcome
    }

    /// A type that won a kind conflict may be method-bearing where the batch
    /// that produced a relationship saw it as a plain type. Every method
    /// endpoint on a method-bearing type gets a node, derived from the merged
    /// state alone so merge order does not matter.
    fn derive_method_nodes(&mut self) {
        for id in std::mem::take(&mut self.derived) {
            self.nodes.remove(&id);
        }

        let mut derived: BTreeMap<String, Node> = BTreeMap::new();
        for relationship in &self.relationships {
            for (type_id, method) in [
                (&relationship.from_id, &relationship.from_method),
                (&relationship.to_id, &relationship.to_method),
            ] {
                if method.is_empty() {
                    continue;
                }
                let Some(method_kind) = self.nodes.get(type_id).and_then(|n| n.kind.method_kind()) else {
                    continue;
                };
                let id = Node::method_id(type_id, method);
                if !self.nodes.contains_key(&id) {
                    derived
                        .entry(id.clone())
                        .or_insert_with(|| Node::new(id, method.as_str(), method_kind));
                }
            }
        }

        for (id, node) in derived {
            debug!("Deriving method node {}", id);
            self.derived.insert(id.clone());
            self.nodes.insert(id, node);
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter()
    }

    pub fn relationships_of(&self, kind: RelationshipKind) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.kind == kind)
    }

    pub fn owner_of(&self, entity: &str) -> Option<&str> {
        self.ownership.get(entity).map(String::as_str)
    }

    pub fn ownership(&self) -> &BTreeMap<String, String> {
        &self.ownership
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }

    /// Graph node id for a relationship endpoint: `"{type}.{method}"` on
    /// method-bearing types, the type id otherwise
    pub fn endpoint_id(&self, type_id: &str, method: &str) -> String {
        let method_bearing = self
            .nodes
            .get(type_id)
            .and_then(|n| n.kind.method_kind())
            .is_some();
        if method_bearing && !method.is_empty() {
            Node::method_id(type_id, method)
        } else {
            type_id.to_string()
        }
    }

    pub fn source_id(&self, relationship: &Relationship) -> String {
        self.endpoint_id(&relationship.from_id, &relationship.from_method)
    }

    pub fn target_id(&self, relationship: &Relationship) -> String {
        self.endpoint_id(&relationship.to_id, &relationship.to_method)
    }

    /// Every relationship endpoint must resolve to a node
    pub fn check_invariants(&self) -> Result<()> {
        for relationship in &self.relationships {
            if relationship.kind == RelationshipKind::Unknown {
                return Err(ArchflowError::InvariantViolation(format!(
                    "unclassified relationship {} -> {} stored",
                    relationship.from_id, relationship.to_id
                )));
            }
            for id in [self.source_id(relationship), self.target_id(relationship)] {
                if !self.nodes.contains_key(&id) {
                    return Err(ArchflowError::InvariantViolation(format!(
                        "{} relationship {} -> {} references missing node {}",
                        relationship.kind, relationship.from_id, relationship.to_id, id
                    )));
                }
            }
        }
        Ok(())
    }

    /// SHA-256 over the canonical JSON of nodes, relationships and ownership
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&self.nodes)?);
        hasher.update(serde_json::to_vec(&self.relationships)?);
        hasher.update(serde_json::to_vec(&self.ownership)?);
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_kind = BTreeMap::new();
        for node in self.nodes.values() {
            *nodes_by_kind.entry(node.kind).or_insert(0) += 1;
        }

        let mut relationships_by_kind = BTreeMap::new();
        for relationship in &self.relationships {
            *relationships_by_kind.entry(relationship.kind).or_insert(0) += 1;
        }

        GraphStats {
            total_nodes: self.nodes.len(),
            total_relationships: self.relationships.len(),
            owned_entities: self.ownership.len(),
            merged_batches: self.merged_batches.len(),
            nodes_by_kind,
            relationships_by_kind,
        }
    }
}
