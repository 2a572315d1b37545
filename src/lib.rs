//! Vaya: family relationship graphs with durable local sync
//!
//! A family graph holds people and relationships and answers ancestor,
//! descendant and common-ancestor queries. Local mutations are recorded in a
//! durable sync queue and delivered to a remote store with bounded retries.

pub mod config;
pub mod error;
pub mod family;
pub mod graph;
pub mod logging;
pub mod sync;
pub mod tooling;
pub mod types;

pub use error::{ApiError, GraphError, StorageError, SyncError};
pub use family::FamilyService;
pub use graph::{FamilyGraph, Person, PersonData, PersonPatch, Relationship, RelationshipKind};
pub use sync::{SyncOperation, SyncQueue, SyncRecord, SyncStats, SyncStatus};
