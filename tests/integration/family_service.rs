//! FamilyService wired to sled the way the CLI wires it.

use serde_json::{json, Map};
use std::sync::Arc;
use tempfile::TempDir;
use vaya::config::GraphConfig;
use vaya::graph::persistence::{GraphRepository, SledGraphRepository};
use vaya::graph::{PersonData, PersonPatch, RelationshipKind, TraversalOptions};
use vaya::sync::queue::SyncConfig;
use vaya::sync::remote::{MemoryRemoteStore, RemoteConfig};
use vaya::sync::storage::SledLocalStorage;
use vaya::sync::{DrainOutcome, SyncOperation, SyncQueue};
use vaya::{ApiError, FamilyService, GraphError};

struct Fixture {
    repository: Arc<SledGraphRepository>,
    queue: Arc<SyncQueue>,
    remote: Arc<MemoryRemoteStore>,
}

fn fixture(db: &sled::Db) -> Fixture {
    let repository = Arc::new(SledGraphRepository::from_db(db).unwrap());
    let storage = Arc::new(SledLocalStorage::from_db(db).unwrap());
    let remote = Arc::new(MemoryRemoteStore::new());
    let config = SyncConfig {
        drain_on_enqueue: false,
        ..SyncConfig::default()
    };
    let queue = Arc::new(SyncQueue::open(storage, remote.clone(), config).unwrap());
    Fixture {
        repository,
        queue,
        remote,
    }
}

fn open_service(fixture: &Fixture, family: &str) -> FamilyService {
    FamilyService::load_or_create(
        fixture.repository.clone(),
        family,
        fixture.queue.clone(),
        &RemoteConfig::default(),
        &GraphConfig::default(),
    )
    .unwrap()
}

#[test]
fn load_requires_an_existing_family() {
    let dir = TempDir::new().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let fixture = fixture(&db);
    let result = FamilyService::load(
        fixture.repository.clone(),
        "missing",
        fixture.queue.clone(),
        &RemoteConfig::default(),
        &GraphConfig::default(),
    );
    assert!(matches!(
        result,
        Err(ApiError::Graph(GraphError::FamilyNotFound(id))) if id == "missing"
    ));
}

#[test]
fn saved_family_reloads_with_queued_rows() {
    let dir = TempDir::new().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let fixture = fixture(&db);

    let service = open_service(&fixture, "boateng");
    let mother = service
        .add_person(PersonData::new("Abena").with_role("mother"))
        .unwrap();
    let son = service.add_person(PersonData::new("Kwesi")).unwrap();
    let mut meta = Map::new();
    meta.insert("adopted".to_string(), json!(false));
    let edge = service
        .add_relationship(&mother.id, &son.id, RelationshipKind::ParentChild, Some(meta))
        .unwrap();
    assert!(service.save().unwrap());

    let reloaded = open_service(&fixture, "boateng");
    assert_eq!(reloaded.people().len(), 2);
    assert_eq!(reloaded.relationships(), vec![edge.clone()]);
    let ancestors = reloaded.ancestors(&son.id, TraversalOptions::default());
    assert_eq!(ancestors, vec![mother.clone()]);
    assert_eq!(fixture.repository.list().unwrap(), vec!["boateng".to_string()]);

    let ops: Vec<_> = fixture
        .queue
        .records()
        .iter()
        .map(|r| (r.table.clone(), r.operation))
        .collect();
    assert_eq!(
        ops,
        vec![
            ("family_members".to_string(), SyncOperation::Insert),
            ("family_members".to_string(), SyncOperation::Insert),
            ("family_relationships".to_string(), SyncOperation::Insert),
        ]
    );
}

#[tokio::test]
async fn remote_converges_on_the_local_graph() {
    let dir = TempDir::new().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let fixture = fixture(&db);
    let service = open_service(&fixture, "darko");

    let a = service.add_person(PersonData::new("Akua")).unwrap();
    let b = service.add_person(PersonData::new("Kofi")).unwrap();
    let edge = service
        .add_relationship(&a.id, &b.id, RelationshipKind::Sibling, None)
        .unwrap();
    service
        .update_person(
            &b.id,
            &PersonPatch {
                role: Some("twin".to_string()),
                ..PersonPatch::default()
            },
        )
        .unwrap();
    service.delete_person(&a.id).unwrap();

    let outcome = fixture.queue.force_sync().await;
    assert!(matches!(outcome, DrainOutcome::Completed(ref r) if r.failed == 0));

    assert!(fixture.remote.row("family_members", &a.id).is_none());
    assert!(fixture.remote.row("family_relationships", &edge.id).is_none());
    let row = fixture.remote.row("family_members", &b.id).unwrap();
    assert_eq!(row["role"], json!("twin"));
    assert_eq!(row["family_id"], json!("darko"));
    assert_eq!(fixture.remote.len("family_members"), 1);
}
