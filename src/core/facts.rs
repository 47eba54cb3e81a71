// src/core/facts.rs
//! Fact model consumed by the architecture engine.
//!
//! Facts are produced by an external extractor (one batch per compiled module)
//! and are read-only for the rest of the pipeline. Every type arrives already
//! tagged with a [`TypeKind`]; nothing here re-derives kinds from names.

use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Method name used for constructors in call edges and method-level ids
pub const CONSTRUCTOR: &str = "ctor";

/// Kind of a node in the architecture graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Controller,
    ControllerMethod,
    Endpoint,
    CommandSender,
    CommandSenderMethod,
    Command,
    Aggregate,
    AggregateMethod,
    Entity,
    EntityMethod,
    DomainEvent,
    IntegrationEvent,
    DomainEventHandler,
    IntegrationEventHandler,
    IntegrationEventConverter,
}

impl NodeKind {
    /// Kind of the method-level nodes hanging off a type of this kind, if any
    pub fn method_kind(self) -> Option<NodeKind> {
        match self {
            NodeKind::Controller => Some(NodeKind::ControllerMethod),
            NodeKind::CommandSender => Some(NodeKind::CommandSenderMethod),
            NodeKind::Aggregate => Some(NodeKind::AggregateMethod),
            NodeKind::Entity => Some(NodeKind::EntityMethod),
            _ => None,
        }
    }

    /// Short lowercase name, used for diagram styling
    pub fn css_class(self) -> &'static str {
        match self {
            NodeKind::Controller | NodeKind::ControllerMethod => "controller",
            NodeKind::Endpoint => "endpoint",
            NodeKind::CommandSender | NodeKind::CommandSenderMethod => "sender",
            NodeKind::Command => "command",
            NodeKind::Aggregate | NodeKind::AggregateMethod => "aggregate",
            NodeKind::Entity | NodeKind::EntityMethod => "entity",
            NodeKind::DomainEvent => "domainEvent",
            NodeKind::IntegrationEvent => "integrationEvent",
            NodeKind::DomainEventHandler => "domainHandler",
            NodeKind::IntegrationEventHandler => "integrationHandler",
            NodeKind::IntegrationEventConverter => "converter",
        }
    }
}

/// Classification of a source type, supplied by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Controller,
    Endpoint,
    CommandSender,
    Command,
    CommandHandler,
    Aggregate,
    Entity,
    DomainEvent,
    IntegrationEvent,
    DomainEventHandler,
    IntegrationEventHandler,
    IntegrationEventConverter,
    Other,
}

impl TypeKind {
    /// Type-level node kind. Command handlers and unclassified types are not nodes.
    pub fn node_kind(self) -> Option<NodeKind> {
        match self {
            TypeKind::Controller => Some(NodeKind::Controller),
            TypeKind::Endpoint => Some(NodeKind::Endpoint),
            TypeKind::CommandSender => Some(NodeKind::CommandSender),
            TypeKind::Command => Some(NodeKind::Command),
            TypeKind::Aggregate => Some(NodeKind::Aggregate),
            TypeKind::Entity => Some(NodeKind::Entity),
            TypeKind::DomainEvent => Some(NodeKind::DomainEvent),
            TypeKind::IntegrationEvent => Some(NodeKind::IntegrationEvent),
            TypeKind::DomainEventHandler => Some(NodeKind::DomainEventHandler),
            TypeKind::IntegrationEventHandler => Some(NodeKind::IntegrationEventHandler),
            TypeKind::IntegrationEventConverter => Some(NodeKind::IntegrationEventConverter),
            TypeKind::CommandHandler | TypeKind::Other => None,
        }
    }

    pub fn is_domain_object(self) -> bool {
        matches!(self, TypeKind::Aggregate | TypeKind::Entity)
    }

    pub fn is_event_handler(self) -> bool {
        matches!(self, TypeKind::DomainEventHandler | TypeKind::IntegrationEventHandler)
    }
}

/// Node in the architecture graph. Compared and deduplicated by `id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }

    /// Natural key of a method-level node
    pub fn method_id(type_id: &str, method: &str) -> String {
        format!("{}.{}", type_id, method)
    }

    /// Natural key of a converter node
    pub fn converter_id(domain_event: &str, integration_event: &str) -> String {
        format!("{}->{}", domain_event, integration_event)
    }
}

/// Reference to a declared type, with generic arguments when present
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub id: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl TypeRef {
    pub fn plain(id: impl Into<String>) -> Self {
        Self { id: id.into(), arguments: Vec::new() }
    }

    pub fn generic(id: impl Into<String>, argument: impl Into<String>) -> Self {
        Self { id: id.into(), arguments: vec![argument.into()] }
    }
}

/// Field or property declared on a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberFact {
    pub name: String,
    pub type_ref: TypeRef,
}

/// Structural contract a type implements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Contract {
    HandlesCommand { command: String },
    HandlesDomainEvent { event: String },
    HandlesIntegrationEvent { event: String },
    ConvertsEvent { domain_event: String, integration_event: String },
}

/// Everything the extractor knows about one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFact {
    /// Fully-qualified name
    pub id: String,
    /// Simple name
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub kind: TypeKind,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub members: Vec<MemberFact>,
    #[serde(default)]
    pub contracts: Vec<Contract>,
}

impl TypeFact {
    /// Create a fact whose simple name is the last segment of `id`
    pub fn new(id: impl Into<String>, kind: TypeKind) -> Self {
        let id = id.into();
        let name = id.rsplit('.').next().unwrap_or(&id).to_string();
        Self {
            id,
            name,
            namespace: None,
            kind,
            methods: Vec::new(),
            members: Vec::new(),
            contracts: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into());
        self
    }

    pub fn with_member(mut self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        self.members.push(MemberFact { name: name.into(), type_ref });
        self
    }

    pub fn with_contract(mut self, contract: Contract) -> Self {
        self.contracts.push(contract);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Explicit namespace, or the id prefix before the last `.`
    pub fn namespace(&self) -> &str {
        match &self.namespace {
            Some(ns) => ns,
            None => self.id.rsplit_once('.').map(|(ns, _)| ns).unwrap_or(""),
        }
    }

    /// Commands this type handles, when it is a command handler
    pub fn handled_commands(&self) -> impl Iterator<Item = &str> {
        self.contracts.iter().filter_map(|c| match c {
            Contract::HandlesCommand { command } => Some(command.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallKind {
    Invocation,
    Construction,
    RaiseDomainEvent,
    SendCommand,
}

/// A call site observed by the extractor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawCallEdge {
    pub source_type: String,
    pub source_method: String,
    pub target_type: String,
    #[serde(default)]
    pub target_method: String,
    pub call_kind: CallKind,
}

impl RawCallEdge {
    pub fn invocation(
        source_type: impl Into<String>,
        source_method: impl Into<String>,
        target_type: impl Into<String>,
        target_method: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            source_method: source_method.into(),
            target_type: target_type.into(),
            target_method: target_method.into(),
            call_kind: CallKind::Invocation,
        }
    }

    pub fn construction(
        source_type: impl Into<String>,
        source_method: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            source_method: source_method.into(),
            target_type: target_type.into(),
            target_method: CONSTRUCTOR.to_string(),
            call_kind: CallKind::Construction,
        }
    }

    pub fn raise(
        source_type: impl Into<String>,
        source_method: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            source_method: source_method.into(),
            target_type: event.into(),
            target_method: String::new(),
            call_kind: CallKind::RaiseDomainEvent,
        }
    }

    pub fn send(
        source_type: impl Into<String>,
        source_method: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            source_method: source_method.into(),
            target_type: command.into(),
            target_method: String::new(),
            call_kind: CallKind::SendCommand,
        }
    }

    /// Target method with constructors normalised to [`CONSTRUCTOR`]
    pub fn callee_method(&self) -> &str {
        match self.call_kind {
            CallKind::Construction => CONSTRUCTOR,
            _ => &self.target_method,
        }
    }
}

/// An aggregate member whose type may hold an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentFact {
    pub aggregate: String,
    pub member: String,
    pub member_type: TypeRef,
}

/// One extractor run's worth of facts, typically one compiled module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactBatch {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub types: Vec<TypeFact>,
    #[serde(default)]
    pub calls: Vec<RawCallEdge>,
}

impl FactBatch {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, fact: TypeFact) -> Self {
        self.types.push(fact);
        self
    }

    pub fn with_call(mut self, edge: RawCallEdge) -> Self {
        self.calls.push(edge);
        self
    }

    /// Lookup table from type id to fact; the first declaration of an id wins
    pub fn type_index(&self) -> HashMap<&str, &TypeFact> {
        let mut index = HashMap::with_capacity(self.types.len());
        for fact in &self.types {
            index.entry(fact.id.as_str()).or_insert(fact);
        }
        index
    }

    /// Types of the given kind, in declaration order
    pub fn types_of(&self, kind: TypeKind) -> Vec<&TypeFact> {
        self.types.iter().filter(|t| t.kind == kind).collect()
    }

    /// Containment facts derived from aggregate members, in declaration order
    pub fn containment_facts(&self) -> Vec<ContainmentFact> {
        self.types
            .iter()
            .filter(|t| t.kind == TypeKind::Aggregate)
            .flat_map(|aggregate| {
                aggregate.members.iter().map(move |member| ContainmentFact {
                    aggregate: aggregate.id.clone(),
                    member: member.name.clone(),
                    member_type: member.type_ref.clone(),
                })
            })
            .collect()
    }

    /// Content hash identifying this batch
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for fact in &self.types {
            hasher.update(fact.id.as_bytes());
            hasher.update(format!("{:?}", fact.kind).as_bytes());
            for method in &fact.methods {
                hasher.update(b"m");
                hasher.update(method.as_bytes());
            }
            for member in &fact.members {
                hasher.update(b"f");
                hasher.update(member.name.as_bytes());
                hasher.update(member.type_ref.id.as_bytes());
                for argument in &member.type_ref.arguments {
                    hasher.update(argument.as_bytes());
                }
            }
            for contract in &fact.contracts {
                hasher.update(format!("{:?}", contract).as_bytes());
            }
            hasher.update(b"\n");
        }
        for call in &self.calls {
            hasher.update(format!("{:?}", call).as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}
