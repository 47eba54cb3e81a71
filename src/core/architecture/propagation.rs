// src/core/architecture/propagation.rs
use std::collections::{BTreeMap, BTreeSet, HashSet};
use serde::{Serialize, Deserialize};

use super::super::facts::{CallKind, RawCallEdge};

/// A method on a type, `(type, method)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub type_id: String,
    pub method: String,
}

impl MethodRef {
    pub fn new(type_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            method: method.into(),
        }
    }
}

/// Transitive domain events per method
pub type EventMap = BTreeMap<MethodRef, BTreeSet<String>>;

/// Method-level call graph with the events each method raises directly
#[derive(Debug, Clone, Default)]
pub struct MethodCallGraph {
    callees: BTreeMap<MethodRef, BTreeSet<MethodRef>>,
    direct_events: BTreeMap<MethodRef, BTreeSet<String>>,
}

impl MethodCallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw edges: invocations and constructions become calls,
    /// raise edges become direct events, command sends are ignored
    pub fn from_edges(edges: &[RawCallEdge]) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            let caller = MethodRef::new(edge.source_type.as_str(), edge.source_method.as_str());
            match edge.call_kind {
                CallKind::Invocation | CallKind::Construction => {
                    let callee = MethodRef::new(edge.target_type.as_str(), edge.callee_method());
                    graph.add_call(caller, callee);
                }
                CallKind::RaiseDomainEvent => {
                    graph.add_event(caller, edge.target_type.as_str());
                }
                CallKind::SendCommand => {}
            }
        }
        graph
    }

    pub fn add_call(&mut self, caller: MethodRef, callee: MethodRef) {
        self.callees.entry(caller).or_default().insert(callee);
    }

    pub fn add_event(&mut self, method: MethodRef, event: impl Into<String>) {
        self.direct_events.entry(method).or_default().insert(event.into());
    }

    pub fn callees(&self, method: &MethodRef) -> impl Iterator<Item = &MethodRef> {
        self.callees.get(method).into_iter().flatten()
    }

    pub fn direct_events(&self, method: &MethodRef) -> impl Iterator<Item = &String> {
        self.direct_events.get(method).into_iter().flatten()
    }

    /// Every method that calls, or raises, anything
    pub fn methods(&self) -> BTreeSet<&MethodRef> {
        self.callees.keys().chain(self.direct_events.keys()).collect()
    }
}

/// Computes the domain events reachable from each method through the call graph.
///
/// Every query keeps its own visited set, so direct and mutual recursion
/// terminate. With `merge_same_name` on, a visited method also picks up the
/// events raised directly by any other method with the same simple name. That
/// stands in for overriding without modelling inheritance and can over-attribute
/// events between unrelated types.
pub struct EventPropagator {
    merge_same_name: bool,
}

impl EventPropagator {
    pub fn new(merge_same_name: bool) -> Self {
        Self { merge_same_name }
    }

    /// Closure for every method in the graph
    pub fn propagate(&self, graph: &MethodCallGraph) -> EventMap {
        let by_name = self.raisers_by_name(graph);
        graph
            .methods()
            .into_iter()
            .map(|method| (method.clone(), self.closure(graph, &by_name, method)))
            .collect()
    }

    /// Closure for a single method
    pub fn events_for(&self, graph: &MethodCallGraph, method: &MethodRef) -> BTreeSet<String> {
        let by_name = self.raisers_by_name(graph);
        self.closure(graph, &by_name, method)
    }

    fn closure<'g>(
        &self,
        graph: &'g MethodCallGraph,
        by_name: &BTreeMap<&'g str, Vec<&'g MethodRef>>,
        root: &MethodRef,
    ) -> BTreeSet<String> {
        let mut events = BTreeSet::new();
        let mut visited: HashSet<&MethodRef> = HashSet::new();
        let mut stack: Vec<&MethodRef> = vec![root];

        while let Some(method) = stack.pop() {
            if !visited.insert(method) {
                continue;
            }

            events.extend(graph.direct_events(method).cloned());

            if self.merge_same_name {
                for other in by_name.get(method.method.as_str()).into_iter().flatten() {
                    if *other != method {
                        events.extend(graph.direct_events(other).cloned());
                    }
                }
            }

            for callee in graph.callees(method) {
                if !visited.contains(callee) {
                    stack.push(callee);
                }
            }
        }

        events
    }

    /// Methods that raise events directly, grouped by simple method name
    fn raisers_by_name<'g>(&self, graph: &'g MethodCallGraph) -> BTreeMap<&'g str, Vec<&'g MethodRef>> {
        let mut by_name: BTreeMap<&str, Vec<&MethodRef>> = BTreeMap::new();
        if self.merge_same_name {
            for method in graph.direct_events.keys() {
                by_name.entry(method.method.as_str()).or_default().push(method);
            }
        }
        by_name
    }
}

impl Default for EventPropagator {
    fn default() -> Self {
        Self::new(true)
    }
}
