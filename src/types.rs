//! Core identifier types shared by the graph and the sync queue.

/// PersonId: opaque identifier of a person node (UUID v4 text)
pub type PersonId = String;

/// RelationshipId: opaque identifier of a relationship edge (UUID v4 text)
pub type RelationshipId = String;

/// FamilyId: identifies one independent family graph
pub type FamilyId = String;

/// Generate a fresh opaque identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
