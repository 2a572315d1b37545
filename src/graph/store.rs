//! Graph Store
//!
//! Primitive mutations on a [`FamilyGraph`]. Operations on unknown ids are no-ops
//! reported through `bool`/`Option` rather than errors, so optimistic callers can
//! ignore them and strict callers can check.

use super::{FamilyGraph, Person, PersonData, PersonPatch, Relationship, RelationshipKind};
use crate::error::GraphError;
use crate::types::new_id;
use serde_json::{Map, Value};

/// What a `delete_person` call removed: the node and the edges cascaded with it.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonRemoval {
    pub person: Person,
    pub relationships: Vec<Relationship>,
}

impl FamilyGraph {
    /// Add a person with a freshly generated id.
    ///
    /// `extra` entries under a reserved key are moved into the typed field first.
    pub fn add_person(&mut self, mut data: PersonData) -> Result<Person, GraphError> {
        data.absorb_reserved_attributes()?;
        if data.full_name.trim().is_empty() {
            return Err(GraphError::MissingName);
        }
        let person = Person { id: new_id(), data };
        self.people.push(person.clone());
        Ok(person)
    }

    /// Merge `patch` into the person's data. Returns `Ok(false)` if `id` is unknown.
    ///
    /// A patch that leaves the person invalid is rejected and nothing changes.
    pub fn update_person(&mut self, id: &str, patch: &PersonPatch) -> Result<bool, GraphError> {
        let Some(person) = self.people.iter_mut().find(|p| p.id == id) else {
            return Ok(false);
        };
        let mut data = person.data.clone();
        patch.apply(&mut data);
        data.absorb_reserved_attributes()?;
        if data.full_name.trim().is_empty() {
            return Err(GraphError::MissingName);
        }
        person.data = data;
        Ok(true)
    }

    /// Remove a person and every relationship that references them.
    pub fn delete_person(&mut self, id: &str) -> Option<PersonRemoval> {
        let index = self.people.iter().position(|p| p.id == id)?;
        let person = self.people.remove(index);

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.relationships)
            .into_iter()
            .partition(|r| r.touches(id));
        self.relationships = kept;

        Some(PersonRemoval {
            person,
            relationships: removed,
        })
    }

    /// Append a relationship without checking that its endpoints exist.
    ///
    /// Callers may add edges before the nodes they reference are loaded; use
    /// [`FamilyGraph::try_add_relationship`] to reject dangling edges.
    pub fn add_relationship(
        &mut self,
        source: &str,
        target: &str,
        kind: RelationshipKind,
        metadata: Option<Map<String, Value>>,
    ) -> Relationship {
        let relationship = Relationship {
            id: new_id(),
            source: source.to_string(),
            target: target.to_string(),
            kind,
            metadata,
        };
        self.relationships.push(relationship.clone());
        relationship
    }

    /// Append a relationship only if both endpoints are people in this graph.
    pub fn try_add_relationship(
        &mut self,
        source: &str,
        target: &str,
        kind: RelationshipKind,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Relationship, GraphError> {
        for endpoint in [source, target] {
            if !self.contains_person(endpoint) {
                return Err(GraphError::DanglingEndpoint(endpoint.to_string()));
            }
        }
        Ok(self.add_relationship(source, target, kind, metadata))
    }

    /// Merge metadata entries into a relationship. `null` values remove keys.
    pub fn update_relationship(&mut self, id: &str, metadata: &Map<String, Value>) -> bool {
        let Some(relationship) = self.relationships.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        let existing = relationship.metadata.get_or_insert_with(Map::new);
        for (key, value) in metadata {
            if value.is_null() {
                existing.remove(key);
            } else {
                existing.insert(key.clone(), value.clone());
            }
        }
        if existing.is_empty() {
            relationship.metadata = None;
        }
        true
    }

    pub fn delete_relationship(&mut self, id: &str) -> Option<Relationship> {
        let index = self.relationships.iter().position(|r| r.id == id)?;
        Some(self.relationships.remove(index))
    }

    /// Relationships with at least one endpoint that is not a person in this graph.
    pub fn dangling_relationships(&self) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|r| !self.contains_person(&r.source) || !self.contains_person(&r.target))
            .collect()
    }
}
