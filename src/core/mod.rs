// src/core/mod.rs
mod engine;
mod exporter;
mod loader;

pub mod facts;

// Fact-to-graph resolution and chain decomposition
pub mod architecture;

pub use facts::{
    FactBatch, TypeFact, TypeKind, TypeRef, MemberFact, Contract, RawCallEdge, CallKind,
    ContainmentFact, Node, NodeKind, CONSTRUCTOR
};
pub use loader::FactLoader;
pub use exporter::{Exporter, ExportMetadata};

pub use architecture::{
    ArchitectureAnalyzer, GraphDelta, Diagnostics,
    GraphStore, GraphStats, MergeOutcome,
    Relationship, RelationshipKind,
    ChainTracer, Chain, ChainNode, ChainEdge, EdgeLabel,
    EntryPoint, EntryPointType
};

// Export the main engine
pub use engine::{Engine, BuildResult, BatchReport};
