// src/core/architecture/classifier.rs
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use serde::{Serialize, Deserialize};
use tracing::debug;

use super::super::facts::{CallKind, Contract, Node, RawCallEdge, TypeFact, TypeKind};
use super::ownership::OwnershipMap;
use super::propagation::EventMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    MethodToCommand,
    CommandToAggregateMethod,
    MethodToDomainEvent,
    DomainEventToHandler,
    IntegrationEventToHandler,
    DomainEventToIntegrationEvent,
    HandlerToCommand,
    /// Placeholder for a call no rule matched; never stored
    Unknown,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Typed edge between two graph endpoints. All five fields form the identity key.
///
/// Methods are empty for type-level endpoints (commands, events, handlers).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from_id: String,
    pub from_method: String,
    pub to_id: String,
    pub to_method: String,
    pub kind: RelationshipKind,
}

impl Relationship {
    pub fn new(
        from_id: impl Into<String>,
        from_method: impl Into<String>,
        to_id: impl Into<String>,
        to_method: impl Into<String>,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            from_method: from_method.into(),
            to_id: to_id.into(),
            to_method: to_method.into(),
            kind,
        }
    }
}

/// Output of classifying one batch
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub relationships: BTreeSet<Relationship>,
    /// Facts referencing type ids absent from the batch
    pub malformed: usize,
    /// Well-formed calls no rule applies to
    pub discarded: usize,
}

impl Classification {
    fn push(&mut self, relationship: Relationship) {
        self.relationships.insert(relationship);
    }
}

/// Turns raw calls, structural contracts and propagated events into typed
/// relationships. Calls landing on an owned entity are rewritten onto the
/// owning aggregate under a child-qualified method name.
pub struct RelationshipClassifier<'a> {
    types: HashMap<&'a str, &'a TypeFact>,
    ownership: &'a OwnershipMap,
}

impl<'a> RelationshipClassifier<'a> {
    pub fn new(types: &'a [TypeFact], ownership: &'a OwnershipMap) -> Self {
        let mut index = HashMap::with_capacity(types.len());
        for fact in types {
            index.entry(fact.id.as_str()).or_insert(fact);
        }
        Self { types: index, ownership }
    }

    /// Classify everything a batch implies
    pub fn classify(&self, edges: &[RawCallEdge], events: &EventMap) -> Classification {
        let mut result = Classification::default();
        self.classify_calls(edges, &mut result);
        self.classify_published_events(events, &mut result);
        self.classify_contracts(&mut result);
        result
    }

    /// Send-command and command-handler calls
    pub fn classify_calls(&self, edges: &[RawCallEdge], result: &mut Classification) {
        for edge in edges {
            let (Some(source), Some(target)) = (
                self.types.get(edge.source_type.as_str()),
                self.types.get(edge.target_type.as_str()),
            ) else {
                debug!(
                    "Dropping call {}.{} -> {}: unknown type",
                    edge.source_type, edge.source_method, edge.target_type
                );
                result.malformed += 1;
                continue;
            };

            // Raised events are attributed through propagation instead
            if edge.call_kind == CallKind::RaiseDomainEvent {
                if target.kind != TypeKind::DomainEvent {
                    debug!(
                        "Dropping raise {}.{} -> {}: not a domain event",
                        edge.source_type, edge.source_method, edge.target_type
                    );
                    result.malformed += 1;
                }
                continue;
            }

            let kind = self.kind_for(source, target, edge);
            match kind {
                RelationshipKind::MethodToCommand | RelationshipKind::HandlerToCommand => {
                    result.push(Relationship::new(
                        &source.id,
                        &edge.source_method,
                        &target.id,
                        "",
                        kind,
                    ));
                }
                RelationshipKind::CommandToAggregateMethod => {
                    let (to_id, to_method) = self.attribute(target, edge.callee_method());
                    let mut handled = source.handled_commands().peekable();
                    if handled.peek().is_none() {
                        result.discarded += 1;
                        continue;
                    }
                    for command in handled {
                        if !self.is_kind(command, TypeKind::Command) {
                            result.malformed += 1;
                            continue;
                        }
                        result.push(Relationship::new(
                            command,
                            "",
                            &to_id,
                            &to_method,
                            RelationshipKind::CommandToAggregateMethod,
                        ));
                    }
                }
                _ => result.discarded += 1,
            }
        }
    }

    /// `MethodToDomainEvent` for every aggregate or entity method with reachable events
    pub fn classify_published_events(&self, events: &EventMap, result: &mut Classification) {
        for (method, raised) in events {
            // Unknown raisers and non-event targets were already counted against their raw edge
            let Some(source) = self.types.get(method.type_id.as_str()) else {
                continue;
            };
            if !source.kind.is_domain_object() {
                continue;
            }

            let (from_id, from_method) = self.attribute(source, &method.method);
            for event in raised {
                if !self.is_kind(event, TypeKind::DomainEvent) {
                    continue;
                }
                result.push(Relationship::new(
                    &from_id,
                    &from_method,
                    event,
                    "",
                    RelationshipKind::MethodToDomainEvent,
                ));
            }
        }
    }

    /// Handler and converter contracts; these do not depend on calls
    pub fn classify_contracts(&self, result: &mut Classification) {
        let mut facts: Vec<&&TypeFact> = self.types.values().collect();
        facts.sort_by(|a, b| a.id.cmp(&b.id));

        for fact in facts {
            for contract in &fact.contracts {
                let relationship = match contract {
                    Contract::HandlesDomainEvent { event } => self.structural(
                        fact,
                        TypeKind::DomainEventHandler,
                        (event.as_str(), TypeKind::DomainEvent),
                        (fact.id.as_str(), fact.kind),
                        RelationshipKind::DomainEventToHandler,
                    ),
                    Contract::HandlesIntegrationEvent { event } => self.structural(
                        fact,
                        TypeKind::IntegrationEventHandler,
                        (event.as_str(), TypeKind::IntegrationEvent),
                        (fact.id.as_str(), fact.kind),
                        RelationshipKind::IntegrationEventToHandler,
                    ),
                    Contract::ConvertsEvent { domain_event, integration_event } => self.structural(
                        fact,
                        TypeKind::IntegrationEventConverter,
                        (domain_event.as_str(), TypeKind::DomainEvent),
                        (integration_event.as_str(), self.kind_of(integration_event)),
                        RelationshipKind::DomainEventToIntegrationEvent,
                    ),
                    Contract::HandlesCommand { .. } => continue,
                };

                match relationship {
                    Some(Ok(relationship)) => result.push(relationship),
                    Some(Err(())) => result.malformed += 1,
                    None => result.discarded += 1,
                }
            }
        }
    }

    /// `None` when the declaring type is of the wrong kind, `Err` when an endpoint is unknown
    fn structural(
        &self,
        fact: &TypeFact,
        expected: TypeKind,
        (from, from_kind): (&str, TypeKind),
        (to, to_kind): (&str, TypeKind),
        kind: RelationshipKind,
    ) -> Option<Result<Relationship, ()>> {
        if fact.kind != expected {
            return None;
        }
        if !self.is_kind(from, from_kind) || !self.types.contains_key(to) {
            return Some(Err(()));
        }
        if kind == RelationshipKind::DomainEventToIntegrationEvent && to_kind != TypeKind::IntegrationEvent {
            return Some(Err(()));
        }
        Some(Ok(Relationship::new(from, "", to, "", kind)))
    }

    /// Rule table for a single call. First match wins.
    fn kind_for(&self, source: &TypeFact, target: &TypeFact, edge: &RawCallEdge) -> RelationshipKind {
        match edge.call_kind {
            CallKind::SendCommand if target.kind == TypeKind::Command => {
                if source.kind.is_event_handler() {
                    RelationshipKind::HandlerToCommand
                } else if source.kind.node_kind().is_some() {
                    RelationshipKind::MethodToCommand
                } else {
                    RelationshipKind::Unknown
                }
            }
            CallKind::Invocation | CallKind::Construction
                if source.kind == TypeKind::CommandHandler && target.kind.is_domain_object() =>
            {
                RelationshipKind::CommandToAggregateMethod
            }
            _ => RelationshipKind::Unknown,
        }
    }

    /// Endpoint for a method on an aggregate or entity, lifted onto the owner
    /// when the entity is owned: `OrderItem.ctor` becomes `(Order, "OrderItem.ctor")`
    fn attribute(&self, fact: &TypeFact, method: &str) -> (String, String) {
        if fact.kind == TypeKind::Entity {
            if let Some(owner) = self.ownership.owner_of(&fact.id) {
                return (owner.to_string(), Node::method_id(&fact.name, method));
            }
        }
        (fact.id.clone(), method.to_string())
    }

    fn kind_of(&self, id: &str) -> TypeKind {
        self.types.get(id).map(|t| t.kind).unwrap_or(TypeKind::Other)
    }

    fn is_kind(&self, id: &str, kind: TypeKind) -> bool {
        self.types.get(id).map_or(false, |t| t.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::architecture::ownership::OwnershipResolver;
    use crate::core::architecture::propagation::{EventPropagator, MethodCallGraph};
    use crate::core::facts::{FactBatch, CONSTRUCTOR};

    fn classify(batch: &FactBatch) -> Classification {
        let aggregates = batch.types_of(TypeKind::Aggregate);
        let entities = batch.types_of(TypeKind::Entity);
        let ownership = OwnershipResolver::default()
            .resolve(&aggregates, &entities, &batch.containment_facts());
        let events = EventPropagator::default().propagate(&MethodCallGraph::from_edges(&batch.calls));
        RelationshipClassifier::new(&batch.types, &ownership).classify(&batch.calls, &events)
    }

    fn ordering_batch() -> FactBatch {
        FactBatch::new("ordering")
            .with_type(TypeFact::new("Order", TypeKind::Aggregate).with_method("AddItem"))
            .with_type(TypeFact::new("OrderItem", TypeKind::Entity).with_method(CONSTRUCTOR))
            .with_type(TypeFact::new("AddItemCommand", TypeKind::Command))
            .with_type(
                TypeFact::new("AddItemHandler", TypeKind::CommandHandler)
                    .with_contract(Contract::HandlesCommand { command: "AddItemCommand".to_string() }),
            )
            .with_type(TypeFact::new("ItemAdded", TypeKind::DomainEvent))
            .with_call(RawCallEdge::construction("AddItemHandler", "Handle", "OrderItem"))
            .with_call(RawCallEdge::raise("OrderItem", CONSTRUCTOR, "ItemAdded"))
    }

    #[test]
    fn test_sub_entity_target_is_rewritten_onto_owner() {
        let result = classify(&ordering_batch());
        assert!(result.relationships.contains(&Relationship::new(
            "AddItemCommand",
            "",
            "Order",
            "OrderItem.ctor",
            RelationshipKind::CommandToAggregateMethod,
        )));
    }

    #[test]
    fn test_sub_entity_events_are_attributed_to_owner() {
        let result = classify(&ordering_batch());
        assert!(result.relationships.contains(&Relationship::new(
            "Order",
            "OrderItem.ctor",
            "ItemAdded",
            "",
            RelationshipKind::MethodToDomainEvent,
        )));
    }

    #[test]
    fn test_unowned_entity_stays_literal_target() {
        let batch = FactBatch::new("t")
            .with_type(TypeFact::new("a.Tag", TypeKind::Entity))
            .with_type(TypeFact::new("b.TagCommand", TypeKind::Command))
            .with_type(
                TypeFact::new("c.TagHandler", TypeKind::CommandHandler)
                    .with_contract(Contract::HandlesCommand { command: "b.TagCommand".to_string() }),
            )
            .with_call(RawCallEdge::invocation("c.TagHandler", "Handle", "a.Tag", "Rename"));

        let result = classify(&batch);
        assert!(result.relationships.contains(&Relationship::new(
            "b.TagCommand",
            "",
            "a.Tag",
            "Rename",
            RelationshipKind::CommandToAggregateMethod,
        )));
    }

    #[test]
    fn test_send_command_from_controller_and_handler() {
        let batch = FactBatch::new("t")
            .with_type(TypeFact::new("OrderController", TypeKind::Controller).with_method("Pay"))
            .with_type(TypeFact::new("PayOrder", TypeKind::Command))
            .with_type(TypeFact::new("Notify", TypeKind::Command))
            .with_type(TypeFact::new("OrderPaid", TypeKind::DomainEvent))
            .with_type(
                TypeFact::new("OrderPaidHandler", TypeKind::DomainEventHandler)
                    .with_contract(Contract::HandlesDomainEvent { event: "OrderPaid".to_string() }),
            )
            .with_call(RawCallEdge::send("OrderController", "Pay", "PayOrder"))
            .with_call(RawCallEdge::send("OrderPaidHandler", "Handle", "Notify"));

        let kinds: Vec<RelationshipKind> = classify(&batch).relationships.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&RelationshipKind::MethodToCommand));
        assert!(kinds.contains(&RelationshipKind::HandlerToCommand));
        assert!(kinds.contains(&RelationshipKind::DomainEventToHandler));
        assert!(!kinds.contains(&RelationshipKind::Unknown));
    }

    #[test]
    fn test_converter_contract_links_events() {
        let batch = FactBatch::new("t")
            .with_type(TypeFact::new("OrderPaid", TypeKind::DomainEvent))
            .with_type(TypeFact::new("OrderPaidIntegration", TypeKind::IntegrationEvent))
            .with_type(
                TypeFact::new("OrderPaidConverter", TypeKind::IntegrationEventConverter).with_contract(
                    Contract::ConvertsEvent {
                        domain_event: "OrderPaid".to_string(),
                        integration_event: "OrderPaidIntegration".to_string(),
                    },
                ),
            );

        let result = classify(&batch);
        assert_eq!(result.relationships.len(), 1);
        let relationship = result.relationships.iter().next().unwrap();
        assert_eq!(relationship.kind, RelationshipKind::DomainEventToIntegrationEvent);
        assert_eq!(relationship.to_id, "OrderPaidIntegration");
    }

    #[test]
    fn test_unknown_ids_are_counted_and_dropped() {
        let batch = FactBatch::new("t")
            .with_type(TypeFact::new("Ctl", TypeKind::Controller))
            .with_type(
                TypeFact::new("Handler", TypeKind::DomainEventHandler)
                    .with_contract(Contract::HandlesDomainEvent { event: "Ghost".to_string() }),
            )
            .with_call(RawCallEdge::send("Ctl", "Post", "MissingCommand"));

        let result = classify(&batch);
        assert!(result.relationships.is_empty());
        assert_eq!(result.malformed, 2);
    }

    #[test]
    fn test_raising_a_non_event_type_is_malformed() {
        let batch = FactBatch::new("t")
            .with_type(TypeFact::new("Order", TypeKind::Aggregate))
            .with_type(TypeFact::new("PayOrder", TypeKind::Command))
            .with_type(TypeFact::new("OrderPaid", TypeKind::DomainEvent))
            .with_call(RawCallEdge::raise("Order", "Pay", "PayOrder"))
            .with_call(RawCallEdge::raise("Order", "Pay", "OrderPaid"));

        let result = classify(&batch);
        assert_eq!(result.malformed, 1);
        assert_eq!(result.relationships.len(), 1);
        assert!(result.relationships.iter().all(|r| r.to_id == "OrderPaid"));
    }

    #[test]
    fn test_plain_invocations_are_discarded() {
        let batch = FactBatch::new("t")
            .with_type(TypeFact::new("Ctl", TypeKind::Controller))
            .with_type(TypeFact::new("Order", TypeKind::Aggregate))
            .with_call(RawCallEdge::invocation("Ctl", "Get", "Order", "Load"));

        let result = classify(&batch);
        assert!(result.relationships.is_empty());
        assert_eq!(result.discarded, 1);
        assert_eq!(result.malformed, 0);
    }

    #[test]
    fn test_events_reached_through_helpers_are_published() {
        let batch = FactBatch::new("t")
            .with_type(TypeFact::new("Order", TypeKind::Aggregate))
            .with_type(TypeFact::new("OrderPaid", TypeKind::DomainEvent))
            .with_call(RawCallEdge::invocation("Order", "Pay", "Order", "Apply"))
            .with_call(RawCallEdge::raise("Order", "Apply", "OrderPaid"));

        let result = classify(&batch);
        let publishers: Vec<&str> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::MethodToDomainEvent)
            .map(|r| r.from_method.as_str())
            .collect();
        assert_eq!(publishers, vec!["Apply", "Pay"]);
    }
}
