// src/core/architecture/entry_points.rs
use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use super::super::facts::NodeKind;
use super::classifier::RelationshipKind;
use super::graph_store::GraphStore;

/// Finds the nodes nothing upstream triggers, where chains start
pub struct EntryPointDetector;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub node_id: String,
    pub entry_type: EntryPointType,
    pub reasoning: String,
}

/// Ordered by tracing priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryPointType {
    /// Controller, endpoint or command sender method that sends a command
    CommandOrigin,
    /// Domain-event handler whose event no earlier chain reaches
    DomainEventHandler,
    /// Integration-event handler whose event no earlier chain reaches
    IntegrationEventHandler,
}

impl EntryPointDetector {
    pub fn new() -> Self {
        Self
    }

    /// Entry points in priority order, then by node id. Each node appears once.
    ///
    /// Command origins come first. Handlers are then taken in rounds: a handler
    /// whose event was visited by an already chosen entry point is covered by
    /// that chain; of the rest, those no other remaining handler reaches become
    /// entry points. When the remaining handlers only reach each other, the
    /// first by priority and id breaks the cycle.
    pub fn detect_entry_points(&self, store: &GraphStore) -> Vec<EntryPoint> {
        let flow = flow_adjacency(store);
        let triggered = triggered_nodes(store);
        let mut found: BTreeMap<(EntryPointType, String), String> = BTreeMap::new();

        for relationship in store.relationships_of(RelationshipKind::MethodToCommand) {
            let Some(origin) = store.node(&relationship.from_id) else {
                continue;
            };
            if !matches!(
                origin.kind,
                NodeKind::Controller | NodeKind::Endpoint | NodeKind::CommandSender
            ) {
                continue;
            }
            let id = store.source_id(relationship);
            if triggered.contains(&id) {
                continue;
            }
            found
                .entry((EntryPointType::CommandOrigin, id))
                .or_insert_with(|| format!("{:?} sends {}", origin.kind, relationship.to_id));
        }

        let mut traced = reachable(&flow, found.keys().map(|(_, id)| id.as_str()));
        let mut pending = handlers(store);

        loop {
            pending.retain(|(_, handler), events| {
                !traced.contains(handler) && !events.iter().any(|event| traced.contains(event))
            });
            if pending.is_empty() {
                break;
            }

            let mut roots: Vec<(EntryPointType, String)> = {
                let reach: Vec<(&(EntryPointType, String), BTreeSet<String>)> = pending
                    .keys()
                    .map(|key| (key, reachable(&flow, [key.1.as_str()])))
                    .collect();
                pending
                    .keys()
                    .filter(|key| {
                        !reach
                            .iter()
                            .any(|(other, reached)| other != key && reached.contains(&key.1))
                    })
                    .cloned()
                    .collect()
            };
            if roots.is_empty() {
                roots.extend(pending.keys().next().cloned());
            }

            for key in roots {
                if let Some(events) = pending.remove(&key) {
                    traced.extend(reachable(&flow, [key.1.as_str()]));
                    found
                        .entry(key)
                        .or_insert_with(|| format!("Handles untraced {}", events.join(", ")));
                }
            }
        }

        let mut seen = BTreeSet::new();
        found
            .into_iter()
            .filter(|((_, id), _)| seen.insert(id.clone()))
            .map(|((entry_type, node_id), reasoning)| EntryPoint {
                node_id,
                entry_type,
                reasoning,
            })
            .collect()
    }
}

impl Default for EntryPointDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Targets of the relationships that carry a flow onward: executed methods,
/// published or converted events
fn triggered_nodes(store: &GraphStore) -> BTreeSet<String> {
    store
        .relationships()
        .filter(|r| {
            matches!(
                r.kind,
                RelationshipKind::CommandToAggregateMethod
                    | RelationshipKind::MethodToDomainEvent
                    | RelationshipKind::DomainEventToIntegrationEvent
            )
        })
        .map(|r| store.target_id(r))
        .collect()
}

/// Domain and integration event handlers with the events they handle
fn handlers(store: &GraphStore) -> BTreeMap<(EntryPointType, String), Vec<String>> {
    let groups = [
        (RelationshipKind::DomainEventToHandler, EntryPointType::DomainEventHandler),
        (RelationshipKind::IntegrationEventToHandler, EntryPointType::IntegrationEventHandler),
    ];

    let mut handlers: BTreeMap<(EntryPointType, String), Vec<String>> = BTreeMap::new();
    for (kind, entry_type) in groups {
        for relationship in store.relationships_of(kind) {
            handlers
                .entry((entry_type, store.target_id(relationship)))
                .or_default()
                .push(store.source_id(relationship));
        }
    }
    handlers
}

/// Node-level successors along every classified relationship
fn flow_adjacency(store: &GraphStore) -> BTreeMap<String, Vec<String>> {
    let mut flow: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for relationship in store.relationships() {
        if relationship.kind == RelationshipKind::Unknown {
            continue;
        }
        flow.entry(store.source_id(relationship))
            .or_default()
            .push(store.target_id(relationship));
    }
    flow
}

/// Every node a chain rooted at `roots` visits, roots included
fn reachable<'a>(
    flow: &BTreeMap<String, Vec<String>>,
    roots: impl IntoIterator<Item = &'a str>,
) -> BTreeSet<String> {
    let mut visited = BTreeSet::new();
    let mut stack: Vec<String> = roots.into_iter().map(str::to_string).collect();

    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        if let Some(next) = flow.get(&node) {
            stack.extend(next.iter().filter(|n| !visited.contains(*n)).cloned());
        }
    }
    visited
}
