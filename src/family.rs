//! Family Service
//!
//! The operations a UI calls on user actions. Each mutation updates the graph
//! (and the attached repository, if any) first and then enqueues the matching
//! remote write, so callers see the change immediately and the remote catches up
//! eventually.

use crate::config::GraphConfig;
use crate::error::{ApiError, GraphError, StorageError};
use crate::graph::persistence::GraphRepository;
use crate::graph::query::{find_ancestors, find_common_ancestors, find_descendants};
use crate::graph::{
    FamilyGraph, Person, PersonData, PersonPatch, PersonRemoval, Relationship, RelationshipKind,
    TraversalOptions,
};
use crate::sync::remote::RemoteConfig;
use crate::sync::{SyncOperation, SyncQueue};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Graph plus its sync queue, shared by every caller of one family.
pub struct FamilyService {
    graph: RwLock<FamilyGraph>,
    queue: Arc<SyncQueue>,
    people_table: String,
    relationships_table: String,
    strict_relationships: bool,
    repository: Option<Arc<dyn GraphRepository>>,
}

impl FamilyService {
    pub fn new(
        graph: FamilyGraph,
        queue: Arc<SyncQueue>,
        remote: &RemoteConfig,
        graph_config: &GraphConfig,
    ) -> Self {
        Self {
            graph: RwLock::new(graph),
            queue,
            people_table: remote.people_table.clone(),
            relationships_table: remote.relationships_table.clone(),
            strict_relationships: graph_config.strict_relationships,
            repository: None,
        }
    }

    /// Attach a repository used by [`FamilyService::save`].
    pub fn with_repository(mut self, repository: Arc<dyn GraphRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Load a stored family. Fails with `FamilyNotFound` if nothing is stored under `family_id`.
    pub fn load(
        repository: Arc<dyn GraphRepository>,
        family_id: &str,
        queue: Arc<SyncQueue>,
        remote: &RemoteConfig,
        graph_config: &GraphConfig,
    ) -> Result<Self, ApiError> {
        let graph = repository
            .load(family_id)?
            .ok_or_else(|| GraphError::FamilyNotFound(family_id.to_string()))?;
        Ok(Self::new(graph, queue, remote, graph_config).with_repository(repository))
    }

    /// Load a stored family, starting an empty one if none exists yet.
    pub fn load_or_create(
        repository: Arc<dyn GraphRepository>,
        family_id: &str,
        queue: Arc<SyncQueue>,
        remote: &RemoteConfig,
        graph_config: &GraphConfig,
    ) -> Result<Self, ApiError> {
        let graph = match repository.load(family_id)? {
            Some(graph) => graph,
            None => {
                info!(family_id, "Starting new family graph");
                FamilyGraph::new(family_id)
            }
        };
        Ok(Self::new(graph, queue, remote, graph_config).with_repository(repository))
    }

    pub fn family_id(&self) -> String {
        self.graph.read().family_id().to_string()
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    pub fn add_person(&self, data: PersonData) -> Result<Person, ApiError> {
        self.commit(
            |graph| Ok(graph.add_person(data)?),
            |service, family_id, person| {
                service.enqueue_person(family_id, person, SyncOperation::Insert)
            },
        )
    }

    /// Merge `patch` into a person's data and return the updated person.
    pub fn update_person(&self, id: &str, patch: &PersonPatch) -> Result<Person, ApiError> {
        self.commit(
            |graph| {
                if !graph.update_person(id, patch)? {
                    return Err(ApiError::PersonNotFound(id.to_string()));
                }
                graph
                    .person(id)
                    .cloned()
                    .ok_or_else(|| ApiError::PersonNotFound(id.to_string()))
            },
            |service, family_id, person| {
                if !patch.is_empty() {
                    service.enqueue_person(family_id, person, SyncOperation::Update);
                }
            },
        )
    }

    /// Remove a person and the relationships that reference them.
    pub fn delete_person(&self, id: &str) -> Result<PersonRemoval, ApiError> {
        let removal = self.commit(
            |graph| {
                graph
                    .delete_person(id)
                    .ok_or_else(|| ApiError::PersonNotFound(id.to_string()))
            },
            |service, _, removal: &PersonRemoval| {
                service.enqueue(&service.people_table, id, SyncOperation::Delete, None);
                for relationship in &removal.relationships {
                    service.enqueue(
                        &service.relationships_table,
                        &relationship.id,
                        SyncOperation::Delete,
                        None,
                    );
                }
            },
        )?;
        debug!(
            person_id = id,
            cascaded = removal.relationships.len(),
            "Deleted person"
        );
        Ok(removal)
    }

    /// Add an edge. With `graph.strict_relationships` both endpoints must exist.
    pub fn add_relationship(
        &self,
        source: &str,
        target: &str,
        kind: RelationshipKind,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Relationship, ApiError> {
        let strict = self.strict_relationships;
        self.commit(
            |graph| {
                if strict {
                    Ok(graph.try_add_relationship(source, target, kind, metadata)?)
                } else {
                    Ok(graph.add_relationship(source, target, kind, metadata))
                }
            },
            |service, family_id, relationship| {
                service.enqueue_relationship(family_id, relationship, SyncOperation::Insert)
            },
        )
    }

    pub fn update_relationship(
        &self,
        id: &str,
        metadata: &Map<String, Value>,
    ) -> Result<Relationship, ApiError> {
        self.commit(
            |graph| {
                if !graph.update_relationship(id, metadata) {
                    return Err(ApiError::RelationshipNotFound(id.to_string()));
                }
                graph
                    .relationship(id)
                    .cloned()
                    .ok_or_else(|| ApiError::RelationshipNotFound(id.to_string()))
            },
            |service, family_id, relationship| {
                service.enqueue_relationship(family_id, relationship, SyncOperation::Update)
            },
        )
    }

    pub fn delete_relationship(&self, id: &str) -> Result<Relationship, ApiError> {
        self.commit(
            |graph| {
                graph
                    .delete_relationship(id)
                    .ok_or_else(|| ApiError::RelationshipNotFound(id.to_string()))
            },
            |service, _, _| {
                service.enqueue(&service.relationships_table, id, SyncOperation::Delete, None)
            },
        )
    }

    pub fn person(&self, id: &str) -> Option<Person> {
        self.graph.read().person(id).cloned()
    }

    pub fn people(&self) -> Vec<Person> {
        self.graph.read().people().to_vec()
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.graph.read().relationships().to_vec()
    }

    pub fn dangling_relationships(&self) -> Vec<Relationship> {
        self.graph
            .read()
            .dangling_relationships()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn ancestors(&self, person_id: &str, options: TraversalOptions) -> Vec<Person> {
        let graph = self.graph.read();
        find_ancestors(&graph, person_id, &options)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn descendants(&self, person_id: &str, options: TraversalOptions) -> Vec<Person> {
        let graph = self.graph.read();
        find_descendants(&graph, person_id, &options)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn common_ancestors(
        &self,
        first: &str,
        second: &str,
        options: TraversalOptions,
    ) -> Vec<Person> {
        let graph = self.graph.read();
        find_common_ancestors(&graph, first, second, &options)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Owned copy of the current graph.
    pub fn snapshot(&self) -> FamilyGraph {
        self.graph.read().clone()
    }

    /// Write the graph to the attached repository. Returns `false` when none is attached.
    ///
    /// Mutations already write through; this is for graphs that were never mutated,
    /// such as a freshly created family.
    pub fn save(&self) -> Result<bool, ApiError> {
        let Some(repository) = &self.repository else {
            return Ok(false);
        };
        let snapshot = self.snapshot();
        repository.save(&snapshot)?;
        debug!(
            family_id = %snapshot.family_id(),
            people = snapshot.people().len(),
            relationships = snapshot.relationships().len(),
            "Saved family graph"
        );
        Ok(true)
    }

    /// Apply one mutation and queue its sync rows under a single write lock.
    ///
    /// With a repository attached the mutated graph is saved before anything is
    /// queued; a failed save leaves both the graph and the queue untouched. Holding
    /// the lock across `queue_sync` keeps rows for one id in mutation order.
    fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut FamilyGraph) -> Result<T, ApiError>,
        queue_rows: impl FnOnce(&Self, &str, &T),
    ) -> Result<T, ApiError> {
        let mut graph = self.graph.write();
        let result = match &self.repository {
            Some(repository) => {
                let mut next = graph.clone();
                let result = mutate(&mut next)?;
                repository.save(&next)?;
                *graph = next;
                result
            }
            None => mutate(&mut *graph)?,
        };
        queue_rows(self, graph.family_id(), &result);
        Ok(result)
    }

    fn enqueue_person(&self, family_id: &str, person: &Person, operation: SyncOperation) {
        match person_row(family_id, person) {
            Ok(row) => self.enqueue(&self.people_table, &person.id, operation, Some(row)),
            Err(e) => warn!(person_id = %person.id, error = %e, "Could not encode person row"),
        }
    }

    fn enqueue_relationship(
        &self,
        family_id: &str,
        relationship: &Relationship,
        operation: SyncOperation,
    ) {
        match relationship_row(family_id, relationship) {
            Ok(row) => self.enqueue(
                &self.relationships_table,
                &relationship.id,
                operation,
                Some(row),
            ),
            Err(e) => warn!(
                relationship_id = %relationship.id,
                error = %e,
                "Could not encode relationship row"
            ),
        }
    }

    // The local mutation already happened; a failed enqueue is reported, not returned.
    fn enqueue(&self, table: &str, id: &str, operation: SyncOperation, payload: Option<Value>) {
        if let Err(e) = self.queue.queue_sync(table, id, operation, payload) {
            warn!(table, id, operation = %operation, error = %e, "Failed to queue sync record");
        }
    }
}

/// Remote row for a person: the person's data plus `id` and `family_id`.
pub fn person_row(family_id: &str, person: &Person) -> Result<Value, StorageError> {
    let mut row = match serde_json::to_value(&person.data)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    row.insert("id".to_string(), Value::String(person.id.clone()));
    row.insert("family_id".to_string(), Value::String(family_id.to_string()));
    Ok(Value::Object(row))
}

/// Remote row for a relationship; `metadata` is `null` when absent.
pub fn relationship_row(family_id: &str, relationship: &Relationship) -> Result<Value, StorageError> {
    let mut row = match serde_json::to_value(relationship)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    row.entry("metadata").or_insert(Value::Null);
    row.insert("family_id".to_string(), Value::String(family_id.to_string()));
    Ok(Value::Object(row))
}
