// src/core/architecture/mod.rs
//! Fact-to-graph resolution and chain decomposition
//!
//! A fact batch flows through ownership resolution, event propagation and
//! relationship classification into a [`GraphDelta`]; deltas merge into a
//! [`GraphStore`], which the [`ChainTracer`] decomposes into one chain per
//! entry point.

mod ownership;
mod propagation;
mod classifier;
mod analyzer;
mod graph_store;
mod entry_points;
mod chain_tracer;

pub use ownership::{OwnershipResolver, OwnershipMap, OwnershipFact, OwnershipTier};
pub use propagation::{EventPropagator, MethodCallGraph, MethodRef, EventMap};
pub use classifier::{RelationshipClassifier, Relationship, RelationshipKind, Classification};
pub use analyzer::{ArchitectureAnalyzer, GraphDelta, Diagnostics};
pub use graph_store::{GraphStore, GraphStats, MergeOutcome};
pub use entry_points::{EntryPointDetector, EntryPoint, EntryPointType};
pub use chain_tracer::{ChainTracer, Chain, ChainNode, ChainEdge, EdgeLabel};
