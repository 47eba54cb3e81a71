// src/core/architecture/ownership.rs
use std::collections::{BTreeMap, HashSet};
use serde::{Serialize, Deserialize};
use tracing::debug;

use super::super::facts::{ContainmentFact, TypeFact, TypeRef};

/// Which resolution tier assigned an owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipTier {
    /// The aggregate declares a member holding the entity
    Containment,
    /// The entity name extends the aggregate name
    Naming,
    /// The aggregate is the only one in the entity's namespace
    Namespace,
}

/// Child entity owned by an aggregate root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnershipFact {
    pub child_entity: String,
    pub owner_aggregate: String,
}

/// Partial function from child entity to owning aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipMap {
    owners: BTreeMap<String, (String, OwnershipTier)>,
    /// Entities left standalone after all tiers
    unresolved: Vec<String>,
}

impl OwnershipMap {
    pub fn owner_of(&self, entity: &str) -> Option<&str> {
        self.owners.get(entity).map(|(owner, _)| owner.as_str())
    }

    pub fn tier_of(&self, entity: &str) -> Option<OwnershipTier> {
        self.owners.get(entity).map(|(_, tier)| *tier)
    }

    pub fn is_owned(&self, entity: &str) -> bool {
        self.owners.contains_key(entity)
    }

    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn facts(&self) -> Vec<OwnershipFact> {
        self.owners
            .iter()
            .map(|(child, (owner, _))| OwnershipFact {
                child_entity: child.clone(),
                owner_aggregate: owner.clone(),
            })
            .collect()
    }

    fn assign(&mut self, entity: &str, aggregate: &str, tier: OwnershipTier) {
        debug!("Entity {} owned by {} ({:?})", entity, aggregate, tier);
        self.owners
            .insert(entity.to_string(), (aggregate.to_string(), tier));
    }
}

/// Resolves child entity ownership in three tiers: structural containment,
/// naming, then namespace co-location. A later tier only sees entities the
/// earlier ones left unmapped.
pub struct OwnershipResolver {
    suffixes: Vec<String>,
}

impl OwnershipResolver {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self { suffixes }
    }

    /// Resolve ownership. Ties are broken by the order of `aggregates`.
    pub fn resolve(
        &self,
        aggregates: &[&TypeFact],
        entities: &[&TypeFact],
        containment: &[ContainmentFact],
    ) -> OwnershipMap {
        let mut map = OwnershipMap::default();
        let entity_ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();

        self.resolve_by_containment(&mut map, aggregates, &entity_ids, containment);
        self.resolve_by_naming(&mut map, aggregates, entities);
        self.resolve_by_namespace(&mut map, aggregates, entities);

        map.unresolved = entities
            .iter()
            .filter(|e| !map.is_owned(&e.id))
            .map(|e| e.id.clone())
            .collect();

        map
    }

    fn resolve_by_containment(
        &self,
        map: &mut OwnershipMap,
        aggregates: &[&TypeFact],
        entity_ids: &HashSet<&str>,
        containment: &[ContainmentFact],
    ) {
        for aggregate in aggregates {
            for fact in containment.iter().filter(|c| c.aggregate == aggregate.id) {
                let Some(entity) = contained_entity(&fact.member_type, entity_ids) else {
                    continue;
                };
                if entity == aggregate.id || map.is_owned(entity) {
                    continue;
                }
                map.assign(entity, &aggregate.id, OwnershipTier::Containment);
            }
        }
    }

    fn resolve_by_naming(
        &self,
        map: &mut OwnershipMap,
        aggregates: &[&TypeFact],
        entities: &[&TypeFact],
    ) {
        for entity in entities {
            if map.is_owned(&entity.id) {
                continue;
            }

            let mut matches = aggregates
                .iter()
                .filter(|a| a.id != entity.id && self.name_matches(&entity.name, &a.name));

            if let Some(first) = matches.next() {
                let others = matches.count();
                if others > 0 {
                    debug!(
                        "Entity {} matches {} aggregates by name, taking {}",
                        entity.id,
                        others + 1,
                        first.id
                    );
                }
                map.assign(&entity.id, &first.id, OwnershipTier::Naming);
            }
        }
    }

    fn resolve_by_namespace(
        &self,
        map: &mut OwnershipMap,
        aggregates: &[&TypeFact],
        entities: &[&TypeFact],
    ) {
        for entity in entities {
            if map.is_owned(&entity.id) {
                continue;
            }

            let candidates: Vec<&&TypeFact> = aggregates
                .iter()
                .filter(|a| a.namespace() == entity.namespace())
                .collect();

            match candidates.as_slice() {
                [only] => map.assign(&entity.id, &only.id, OwnershipTier::Namespace),
                [] => debug!("Entity {} has no aggregate in its namespace", entity.id),
                many => debug!(
                    "Entity {} shares its namespace with {} aggregates, left standalone",
                    entity.id,
                    many.len()
                ),
            }
        }
    }

    /// `OrderItem` belongs to `Order` by prefix, `OrderLine` also by suffix stripping
    fn name_matches(&self, entity: &str, aggregate: &str) -> bool {
        if aggregate.is_empty() {
            return false;
        }
        if entity.starts_with(aggregate) && entity.len() > aggregate.len() {
            return true;
        }
        self.suffixes.iter().any(|suffix| {
            entity
                .strip_suffix(suffix.as_str())
                .map_or(false, |base| base.eq_ignore_ascii_case(aggregate))
        })
    }
}

impl Default for OwnershipResolver {
    fn default() -> Self {
        Self::new(
            ["Item", "Detail", "Info", "Line"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

/// Entity held by a member: directly, or as the single argument of a generic container
fn contained_entity<'a>(type_ref: &'a TypeRef, entity_ids: &HashSet<&str>) -> Option<&'a str> {
    if entity_ids.contains(type_ref.id.as_str()) {
        return Some(&type_ref.id);
    }
    match type_ref.arguments.as_slice() {
        [argument] if entity_ids.contains(argument.as_str()) => Some(argument),
        _ => None,
    }
}
