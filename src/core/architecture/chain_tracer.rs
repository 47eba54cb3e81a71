// src/core/architecture/chain_tracer.rs
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{ArchflowError, Result};
use super::super::facts::NodeKind;
use super::classifier::RelationshipKind;
use super::entry_points::{EntryPoint, EntryPointDetector};
use super::graph_store::GraphStore;

/// Traces one diagram-ready chain per entry point.
///
/// Each chain keeps its own visited set: a node already in the chain is linked
/// to again but never re-expanded, so cycles show up as closing edges.
pub struct ChainTracer {
    entry_point_detector: EntryPointDetector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeLabel {
    Sends,
    Execute,
    Publishes,
    Handles,
    Converts,
}

impl EdgeLabel {
    pub fn for_relationship(kind: RelationshipKind) -> Option<Self> {
        match kind {
            RelationshipKind::MethodToCommand | RelationshipKind::HandlerToCommand => Some(EdgeLabel::Sends),
            RelationshipKind::CommandToAggregateMethod => Some(EdgeLabel::Execute),
            RelationshipKind::MethodToDomainEvent => Some(EdgeLabel::Publishes),
            RelationshipKind::DomainEventToHandler | RelationshipKind::IntegrationEventToHandler => {
                Some(EdgeLabel::Handles)
            }
            RelationshipKind::DomainEventToIntegrationEvent => Some(EdgeLabel::Converts),
            RelationshipKind::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeLabel::Sends => "sends",
            EdgeLabel::Execute => "execute",
            EdgeLabel::Publishes => "publishes",
            EdgeLabel::Handles => "handles",
            EdgeLabel::Converts => "converts",
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNode {
    /// Diagram-local id, unique within the chain only
    pub local_id: String,
    /// Global graph node id
    pub node_id: String,
    pub name: String,
    /// `None` only when the store is missing the node
    pub kind: Option<NodeKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEdge {
    pub from: String,
    pub to: String,
    pub label: EdgeLabel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    /// Named after the entry node id
    pub name: String,
    pub entry_point: Option<EntryPoint>,
    /// In discovery order; the first node is the entry
    pub nodes: Vec<ChainNode>,
    pub edges: Vec<ChainEdge>,
}

impl Chain {
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.node_id.as_str())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n.node_id == node_id)
    }

    pub fn labels(&self) -> Vec<EdgeLabel> {
        self.edges.iter().map(|e| e.label).collect()
    }
}

/// Outgoing labelled edges per graph node id
type Adjacency = BTreeMap<String, Vec<(String, EdgeLabel)>>;

impl ChainTracer {
    pub fn new() -> Self {
        Self {
            entry_point_detector: EntryPointDetector::new(),
        }
    }

    /// One chain per detected entry point, in entry point order
    pub fn trace_chains(&self, store: &GraphStore) -> Vec<Chain> {
        let entry_points = self.entry_point_detector.detect_entry_points(store);
        let adjacency = build_adjacency(store);

        entry_points
            .into_iter()
            .map(|entry_point| {
                let mut chain = trace(store, &adjacency, &entry_point.node_id);
                chain.entry_point = Some(entry_point);
                chain
            })
            .collect()
    }

    /// Chain rooted at any node of the store
    pub fn trace_from(&self, store: &GraphStore, node_id: &str) -> Result<Chain> {
        if store.node(node_id).is_none() {
            return Err(ArchflowError::UnknownEntryPoint(node_id.to_string()));
        }
        let adjacency = build_adjacency(store);
        Ok(trace(store, &adjacency, node_id))
    }
}

impl Default for ChainTracer {
    fn default() -> Self {
        Self::new()
    }
}

fn build_adjacency(store: &GraphStore) -> Adjacency {
    let mut adjacency: Adjacency = BTreeMap::new();
    for relationship in store.relationships() {
        let Some(label) = EdgeLabel::for_relationship(relationship.kind) else {
            continue;
        };
        let targets = adjacency.entry(store.source_id(relationship)).or_default();
        let target = (store.target_id(relationship), label);
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    // Handlers before conversions, otherwise keep relationship order
    for targets in adjacency.values_mut() {
        targets.sort_by_key(|(_, label)| *label);
    }
    adjacency
}

fn trace(store: &GraphStore, adjacency: &Adjacency, entry: &str) -> Chain {
    let mut builder = ChainBuilder::new(store);
    let root = builder.local_id(entry);
    builder.expand(adjacency, entry, &root);

    debug!(
        "Traced chain {}: {} nodes, {} edges",
        entry,
        builder.nodes.len(),
        builder.edges.len()
    );

    Chain {
        name: entry.to_string(),
        entry_point: None,
        nodes: builder.nodes,
        edges: builder.edges,
    }
}

/// Chain-local state: visited nodes with their diagram ids, and recorded edges
struct ChainBuilder<'s> {
    store: &'s GraphStore,
    local_ids: HashMap<String, String>,
    nodes: Vec<ChainNode>,
    edges: Vec<ChainEdge>,
    seen_edges: HashSet<(String, String, EdgeLabel)>,
}

impl<'s> ChainBuilder<'s> {
    fn new(store: &'s GraphStore) -> Self {
        Self {
            store,
            local_ids: HashMap::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            seen_edges: HashSet::new(),
        }
    }

    /// Local id for `node_id`, adding the node on first sight
    fn local_id(&mut self, node_id: &str) -> String {
        if let Some(local) = self.local_ids.get(node_id) {
            return local.clone();
        }

        let local = format!("N{}", self.nodes.len());
        let (name, kind) = match self.store.node(node_id) {
            Some(node) => (node.name.clone(), Some(node.kind)),
            None => (node_id.to_string(), None),
        };
        self.nodes.push(ChainNode {
            local_id: local.clone(),
            node_id: node_id.to_string(),
            name,
            kind,
        });
        self.local_ids.insert(node_id.to_string(), local.clone());
        local
    }

    fn expand(&mut self, adjacency: &Adjacency, node_id: &str, local: &str) {
        let Some(targets) = adjacency.get(node_id) else {
            return;
        };

        for (target, label) in targets {
            let visited = self.local_ids.contains_key(target);
            let target_local = self.local_id(target);

            if self
                .seen_edges
                .insert((local.to_string(), target_local.clone(), *label))
            {
                self.edges.push(ChainEdge {
                    from: local.to_string(),
                    to: target_local.clone(),
                    label: *label,
                });
            }

            if !visited {
                self.expand(adjacency, target, &target_local);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::architecture::analyzer::ArchitectureAnalyzer;
    use crate::core::architecture::entry_points::EntryPointType;
    use crate::core::facts::{Contract, FactBatch, RawCallEdge, TypeFact, TypeKind};

    fn store(batch: &FactBatch) -> GraphStore {
        GraphStore::from_deltas([ArchitectureAnalyzer::default().analyze(batch)])
    }

    fn handler(id: &str, event: &str) -> TypeFact {
        TypeFact::new(id, TypeKind::DomainEventHandler)
            .with_contract(Contract::HandlesDomainEvent { event: event.to_string() })
    }

    fn command_handler(id: &str, command: &str) -> TypeFact {
        TypeFact::new(id, TypeKind::CommandHandler)
            .with_contract(Contract::HandlesCommand { command: command.to_string() })
    }

    fn pay_order() -> FactBatch {
        FactBatch::new("ordering")
            .with_type(TypeFact::new("OrderController", TypeKind::Controller).with_method("Pay"))
            .with_type(TypeFact::new("PayOrderCommand", TypeKind::Command))
            .with_type(TypeFact::new("NotifyCommand", TypeKind::Command))
            .with_type(command_handler("PayOrderCommandHandler", "PayOrderCommand"))
            .with_type(TypeFact::new("Order", TypeKind::Aggregate).with_method("MarkPaid"))
            .with_type(TypeFact::new("OrderPaidEvent", TypeKind::DomainEvent))
            .with_type(handler("OrderPaidHandler", "OrderPaidEvent"))
            .with_call(RawCallEdge::send("OrderController", "Pay", "PayOrderCommand"))
            .with_call(RawCallEdge::invocation("PayOrderCommandHandler", "Handle", "Order", "MarkPaid"))
            .with_call(RawCallEdge::raise("Order", "MarkPaid", "OrderPaidEvent"))
            .with_call(RawCallEdge::send("OrderPaidHandler", "Handle", "NotifyCommand"))
    }

    #[test]
    fn test_pay_order_scenario() {
        let chains = ChainTracer::new().trace_chains(&store(&pay_order()));
        assert_eq!(chains.len(), 1);

        let chain = &chains[0];
        assert_eq!(chain.name, "OrderController.Pay");
        assert_eq!(
            chain.node_ids().collect::<Vec<_>>(),
            vec![
                "OrderController.Pay",
                "PayOrderCommand",
                "Order.MarkPaid",
                "OrderPaidEvent",
                "OrderPaidHandler",
                "NotifyCommand",
            ]
        );
        assert_eq!(
            chain.labels(),
            vec![
                EdgeLabel::Sends,
                EdgeLabel::Execute,
                EdgeLabel::Publishes,
                EdgeLabel::Handles,
                EdgeLabel::Sends,
            ]
        );
        assert_eq!(
            chain.entry_point.as_ref().map(|e| e.entry_type),
            Some(EntryPointType::CommandOrigin)
        );
    }

    #[test]
    fn test_loop_back_to_earlier_command_closes_the_chain() {
        let batch = pay_order().with_call(RawCallEdge::send("OrderPaidHandler", "Handle", "PayOrderCommand"));
        let chain = &ChainTracer::new().trace_chains(&store(&batch))[0];

        assert_eq!(chain.nodes.len(), 6);
        assert_eq!(chain.edges.len(), 6);
        let closing = chain
            .edges
            .iter()
            .find(|e| e.to == "N1" && e.from != "N0")
            .expect("closing edge");
        assert_eq!(closing.label, EdgeLabel::Sends);
        assert_eq!(closing.from, "N4");
    }

    #[test]
    fn test_self_triggering_cycle_terminates() {
        let batch = FactBatch::new("loop")
            .with_type(TypeFact::new("Ctl", TypeKind::Controller))
            .with_type(TypeFact::new("Tick", TypeKind::Command))
            .with_type(command_handler("TickHandler", "Tick"))
            .with_type(TypeFact::new("Clock", TypeKind::Aggregate))
            .with_type(TypeFact::new("Ticked", TypeKind::DomainEvent))
            .with_type(handler("TickedHandler", "Ticked"))
            .with_call(RawCallEdge::send("Ctl", "Start", "Tick"))
            .with_call(RawCallEdge::invocation("TickHandler", "Handle", "Clock", "Tick"))
            .with_call(RawCallEdge::raise("Clock", "Tick", "Ticked"))
            .with_call(RawCallEdge::send("TickedHandler", "Handle", "Tick"));

        let chains = ChainTracer::new().trace_chains(&store(&batch));
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].nodes.len(), 5);
        assert_eq!(chains[0].edges.len(), 5);
    }

    #[test]
    fn test_conversions_follow_handlers() {
        let batch = FactBatch::new("t")
            .with_type(TypeFact::new("Ctl", TypeKind::Controller))
            .with_type(TypeFact::new("Pay", TypeKind::Command))
            .with_type(TypeFact::new("Ship", TypeKind::Command))
            .with_type(TypeFact::new("Mail", TypeKind::Command))
            .with_type(command_handler("PayHandler", "Pay"))
            .with_type(TypeFact::new("Order", TypeKind::Aggregate))
            .with_type(TypeFact::new("Paid", TypeKind::DomainEvent))
            .with_type(TypeFact::new("PaidIe", TypeKind::IntegrationEvent))
            .with_type(handler("ZHandler", "Paid"))
            .with_type(
                TypeFact::new("AConverter", TypeKind::IntegrationEventConverter).with_contract(
                    Contract::ConvertsEvent {
                        domain_event: "Paid".to_string(),
                        integration_event: "PaidIe".to_string(),
                    },
                ),
            )
            .with_type(
                TypeFact::new("PaidIeHandler", TypeKind::IntegrationEventHandler)
                    .with_contract(Contract::HandlesIntegrationEvent { event: "PaidIe".to_string() }),
            )
            .with_call(RawCallEdge::send("Ctl", "Post", "Pay"))
            .with_call(RawCallEdge::invocation("PayHandler", "Handle", "Order", "Pay"))
            .with_call(RawCallEdge::raise("Order", "Pay", "Paid"))
            .with_call(RawCallEdge::send("ZHandler", "Handle", "Ship"))
            .with_call(RawCallEdge::send("PaidIeHandler", "Handle", "Mail"));

        let chains = ChainTracer::new().trace_chains(&store(&batch));
        assert_eq!(chains.len(), 1);
        assert_eq!(
            chains[0].node_ids().collect::<Vec<_>>(),
            vec!["Ctl.Post", "Pay", "Order.Pay", "Paid", "ZHandler", "Ship", "PaidIe", "PaidIeHandler", "Mail"]
        );
        assert!(chains[0].labels().contains(&EdgeLabel::Converts));
    }

    #[test]
    fn test_chains_are_independent_views() {
        let batch = pay_order()
            .with_type(TypeFact::new("AdminController", TypeKind::Controller))
            .with_call(RawCallEdge::send("AdminController", "ForcePay", "PayOrderCommand"));

        let chains = ChainTracer::new().trace_chains(&store(&batch));
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].name, "AdminController.ForcePay");
        for chain in &chains {
            assert_eq!(chain.nodes.len(), 6);
            assert!(chain.contains("OrderPaidEvent"));
            assert_eq!(chain.nodes[0].local_id, "N0");
        }
    }

    #[test]
    fn test_untraced_publisher_handler_gets_its_own_chain() {
        let batch = FactBatch::new("expiry")
            .with_type(TypeFact::new("Order", TypeKind::Aggregate))
            .with_type(TypeFact::new("OrderExpired", TypeKind::DomainEvent))
            .with_type(TypeFact::new("Notify", TypeKind::Command))
            .with_type(handler("ExpiredHandler", "OrderExpired"))
            .with_call(RawCallEdge::raise("Order", "Expire", "OrderExpired"))
            .with_call(RawCallEdge::send("ExpiredHandler", "Handle", "Notify"));

        let chains = ChainTracer::new().trace_chains(&store(&batch));
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].name, "ExpiredHandler");
        assert_eq!(chains[0].node_ids().collect::<Vec<_>>(), vec!["ExpiredHandler", "Notify"]);
        assert_eq!(chains[0].labels(), vec![EdgeLabel::Sends]);
    }

    #[test]
    fn test_tracing_is_deterministic() {
        let graph = store(&pay_order());
        let tracer = ChainTracer::new();
        assert_eq!(tracer.trace_chains(&graph), tracer.trace_chains(&graph));
    }

    #[test]
    fn test_trace_from_unknown_node_fails() {
        let graph = store(&pay_order());
        let tracer = ChainTracer::new();

        let chain = tracer.trace_from(&graph, "OrderPaidEvent").unwrap();
        assert_eq!(chain.nodes.len(), 3);

        match tracer.trace_from(&graph, "Nope") {
            Err(ArchflowError::UnknownEntryPoint(id)) => assert_eq!(id, "Nope"),
            other => panic!("expected unknown entry point, got {:?}", other),
        }
    }
}
