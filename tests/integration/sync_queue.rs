//! Sync queue behavior across restarts and against unreliable remotes.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use vaya::sync::queue::SyncConfig;
use vaya::sync::remote::{MemoryRemoteStore, RemoteStore, UnconfiguredRemote};
use vaya::sync::storage::{FileLocalStorage, LocalStorage};
use vaya::sync::{DrainOutcome, DrainReport, SyncOperation, SyncQueue, SyncStatus};
use vaya::SyncError;

/// Fails the first `failures` calls for each row, then delegates to memory tables.
struct FlakyRemote {
    failures: u32,
    seen: Mutex<HashMap<(String, String), u32>>,
    rows: MemoryRemoteStore,
}

impl FlakyRemote {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            seen: Mutex::new(HashMap::new()),
            rows: MemoryRemoteStore::new(),
        }
    }

    fn attempt(&self, table: &str, id: &str) -> Result<(), SyncError> {
        let mut seen = self.seen.lock();
        let count = seen.entry((table.to_string(), id.to_string())).or_insert(0);
        *count += 1;
        if *count <= self.failures {
            return Err(SyncError::Remote {
                table: table.to_string(),
                id: id.to_string(),
                message: "503 Service Unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn upsert(&self, table: &str, id: &str, row: &Value) -> Result<(), SyncError> {
        self.attempt(table, id)?;
        self.rows.upsert(table, id, row).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), SyncError> {
        self.attempt(table, id)?;
        self.rows.delete(table, id).await
    }
}

fn manual() -> SyncConfig {
    SyncConfig {
        drain_on_enqueue: false,
        ..SyncConfig::default()
    }
}

fn completed(outcome: DrainOutcome) -> DrainReport {
    match outcome {
        DrainOutcome::Completed(report) => report,
        DrainOutcome::AlreadyRunning => panic!("expected a completed drain"),
    }
}

#[tokio::test]
async fn queue_survives_restart_and_delivers_later() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn LocalStorage> = Arc::new(FileLocalStorage::new(dir.path()).unwrap());

    {
        let offline = SyncQueue::open(storage.clone(), Arc::new(UnconfiguredRemote), manual())
            .unwrap();
        offline
            .queue_sync(
                "family_members",
                "p1",
                SyncOperation::Insert,
                Some(json!({"full_name": "Ada"})),
            )
            .unwrap();
        offline
            .queue_sync(
                "family_members",
                "p1",
                SyncOperation::Update,
                Some(json!({"full_name": "Ada Obi"})),
            )
            .unwrap();
        let report = completed(offline.force_sync().await);
        assert_eq!(report.failed, 1);
        assert_eq!(report.deferred, 1);
        offline.destroy().await.unwrap();
    }

    let remote = Arc::new(MemoryRemoteStore::new());
    let queue = SyncQueue::open(storage.clone(), remote.clone(), manual()).unwrap();
    let records = queue.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].sync_status, SyncStatus::Failed);
    assert_eq!(records[0].retries, 1);
    assert_eq!(records[1].sync_status, SyncStatus::Pending);

    let report = completed(queue.force_sync().await);
    assert_eq!(report.succeeded, 2);
    assert_eq!(
        remote.row("family_members", "p1").unwrap()["full_name"],
        json!("Ada Obi")
    );
    assert_eq!(queue.stats().total, 0);
    assert_eq!(storage.get("vaya.sync_queue").unwrap().as_deref(), Some("[]"));
}

#[tokio::test]
async fn transient_failures_recover_within_the_retry_budget() {
    let remote = Arc::new(FlakyRemote::new(2));
    let storage: Arc<dyn LocalStorage> = Arc::new(vaya::sync::storage::MemoryLocalStorage::new());
    let queue = SyncQueue::open(storage, remote.clone(), manual()).unwrap();

    queue
        .queue_sync(
            "family_relationships",
            "r1",
            SyncOperation::Insert,
            Some(json!({"source": "a", "target": "b", "type": "spouse"})),
        )
        .unwrap();

    assert_eq!(completed(queue.force_sync().await).failed, 1);
    assert_eq!(completed(queue.force_sync().await).failed, 1);
    let third = completed(queue.force_sync().await);
    assert_eq!(third.succeeded, 1);
    assert_eq!(third.dropped, 0);

    assert!(remote.rows.row("family_relationships", "r1").is_some());
    assert!(queue.dropped_records().is_empty());
}

#[tokio::test]
async fn persistent_failures_are_dropped_and_reported() {
    let config = SyncConfig {
        max_retries: 2,
        ..manual()
    };
    let storage: Arc<dyn LocalStorage> = Arc::new(vaya::sync::storage::MemoryLocalStorage::new());
    let queue = SyncQueue::open(storage, Arc::new(UnconfiguredRemote), config).unwrap();
    queue
        .queue_sync("family_members", "gone", SyncOperation::Delete, None)
        .unwrap();

    assert_eq!(completed(queue.force_sync().await).dropped, 0);
    assert_eq!(completed(queue.force_sync().await).dropped, 1);
    assert!(queue.records().is_empty());
    assert_eq!(queue.stats().dropped, 1);

    let dropped = queue.take_dropped();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].id, "gone");
    assert_eq!(dropped[0].retries, 2);
    assert!(queue.dropped_records().is_empty());

    // nothing left to attempt
    assert_eq!(completed(queue.force_sync().await).attempted, 0);
}
