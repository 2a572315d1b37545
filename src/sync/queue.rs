//! Sync Queue
//!
//! Ordered, at-least-once delivery of local mutations to a remote store. The whole
//! record list is mirrored to durable local storage after every change, so queued
//! work survives restarts. A drain walks the queue in insertion order, one remote
//! call at a time; at most one drain runs at any moment.

use super::remote::RemoteStore;
use super::storage::LocalStorage;
use super::{SyncOperation, SyncRecord, SyncStats, SyncStatus};
use crate::error::{StorageError, SyncError};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Configuration for the sync queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Failed attempts after which a record is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds between periodic drains
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for a single remote call (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Key the record list is stored under
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Spawn a drain right after each enqueue (needs a tokio runtime)
    #[serde(default = "default_true")]
    pub drain_on_enqueue: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_interval_secs() -> u64 {
    60
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_storage_key() -> String {
    "vaya.sync_queue".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            interval_secs: default_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            storage_key: default_storage_key(),
            drain_on_enqueue: default_true(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("sync.max_retries must be at least 1".to_string());
        }
        if self.interval_secs == 0 {
            return Err("sync.interval_secs must be at least 1".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("sync.request_timeout_ms must be at least 1".to_string());
        }
        if self.storage_key.trim().is_empty() {
            return Err("sync.storage_key must not be empty".to_string());
        }
        Ok(())
    }
}

/// Result of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Remote calls made
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Records skipped because an earlier record for the same row failed this pass
    pub deferred: usize,
    /// Records removed after exhausting their retries
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    AlreadyRunning,
    Completed(DrainReport),
}

struct TimerHandle {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

/// Releases the drain flag however the drain ends, including cancellation.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct QueueInner {
    records: Mutex<Vec<SyncRecord>>,
    dropped: Mutex<Vec<SyncRecord>>,
    dropped_total: AtomicUsize,
    next_seq: AtomicU64,
    draining: AtomicBool,
    /// Serializes snapshot-and-write so an older snapshot never lands last
    persist_lock: Mutex<()>,
    persist_failures: AtomicU64,
    storage: Arc<dyn LocalStorage>,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
}

/// Durable mutation queue
///
/// Lifecycle: [`SyncQueue::open`] loads persisted records, [`SyncQueue::start`]
/// begins periodic draining, [`SyncQueue::destroy`] stops it.
pub struct SyncQueue {
    inner: Arc<QueueInner>,
    timer: Mutex<Option<TimerHandle>>,
}

impl SyncQueue {
    /// Open the queue, restoring any records persisted under `config.storage_key`.
    pub fn open(
        storage: Arc<dyn LocalStorage>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let mut records: Vec<SyncRecord> = match storage.get(&config.storage_key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(StorageError::from)?,
            None => Vec::new(),
        };
        // seq is local bookkeeping; renumber in stored order
        for (index, record) in records.iter_mut().enumerate() {
            record.seq = index as u64 + 1;
        }
        let next_seq = records.len() as u64 + 1;

        if !records.is_empty() {
            info!(
                records = records.len(),
                storage_key = %config.storage_key,
                "Restored sync queue"
            );
        }

        Ok(Self {
            inner: Arc::new(QueueInner {
                records: Mutex::new(records),
                dropped: Mutex::new(Vec::new()),
                dropped_total: AtomicUsize::new(0),
                next_seq: AtomicU64::new(next_seq),
                draining: AtomicBool::new(false),
                persist_lock: Mutex::new(()),
                persist_failures: AtomicU64::new(0),
                storage,
                remote,
                config,
            }),
            timer: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Append a pending record and persist the queue.
    ///
    /// When persisting fails the record stays queued in memory and the storage
    /// error is returned.
    pub fn queue_sync(
        &self,
        table: &str,
        id: &str,
        operation: SyncOperation,
        payload: Option<Value>,
    ) -> Result<SyncRecord, SyncError> {
        if operation.needs_payload() && payload.is_none() {
            return Err(SyncError::MissingPayload {
                table: table.to_string(),
                id: id.to_string(),
                operation: operation.to_string(),
            });
        }

        let record = SyncRecord {
            seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
            table: table.to_string(),
            id: id.to_string(),
            operation,
            timestamp: Utc::now(),
            payload: if operation.needs_payload() { payload } else { None },
            sync_status: SyncStatus::Pending,
            retries: 0,
        };

        let queue_len = {
            let mut records = self.inner.records.lock();
            records.push(record.clone());
            records.len()
        };

        debug!(
            table,
            id,
            operation = %operation,
            queue_len,
            "Queued sync record"
        );

        let persisted = self.inner.persist();

        if self.inner.config.drain_on_enqueue {
            self.spawn_drain();
        }

        persisted?;
        Ok(record)
    }

    /// Drain now. Returns `AlreadyRunning` without waiting if a drain is active.
    pub async fn force_sync(&self) -> DrainOutcome {
        self.inner.drain().await
    }

    pub fn stats(&self) -> SyncStats {
        let (pending, failed) = {
            let records = self.inner.records.lock();
            let pending = records
                .iter()
                .filter(|r| r.sync_status == SyncStatus::Pending)
                .count();
            let failed = records
                .iter()
                .filter(|r| r.sync_status == SyncStatus::Failed)
                .count();
            (pending, failed)
        };
        SyncStats {
            pending,
            failed,
            completed: 0,
            total: pending + failed,
            dropped: self.inner.dropped_total.load(Ordering::Relaxed),
            persist_failures: self.inner.persist_failures.load(Ordering::Relaxed),
            draining: self.inner.draining.load(Ordering::Acquire),
        }
    }

    /// Snapshot of queued records in delivery order.
    pub fn records(&self) -> Vec<SyncRecord> {
        self.inner.records.lock().clone()
    }

    /// Records dropped after exhausting retries that have not been taken yet.
    pub fn dropped_records(&self) -> Vec<SyncRecord> {
        self.inner.dropped.lock().clone()
    }

    pub fn take_dropped(&self) -> Vec<SyncRecord> {
        std::mem::take(&mut *self.inner.dropped.lock())
    }

    /// Start the periodic drain timer. Calling it again while running is a no-op.
    pub fn start(&self) -> Result<(), SyncError> {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        let period = self.inner.config.interval();
        let shutdown = Arc::new(Notify::new());
        let stop = Arc::clone(&shutdown);
        let inner = Arc::clone(&self.inner);

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.notified() => break,
                    _ = ticker.tick() => {
                        if let DrainOutcome::Completed(report) = inner.drain().await {
                            debug!(?report, "Periodic sync drain finished");
                        }
                    }
                }
            }
            debug!("Sync timer stopped");
        });

        *timer = Some(TimerHandle { handle, shutdown });
        info!(interval_secs = period.as_secs(), "Started sync timer");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Stop the periodic timer, wait for it to exit, and persist the queue.
    pub async fn destroy(&self) -> Result<(), SyncError> {
        let timer = self.timer.lock().take();
        if let Some(TimerHandle { handle, shutdown }) = timer {
            shutdown.notify_one();
            if let Err(e) = handle.await {
                warn!(error = %e, "Sync timer task ended abnormally");
            }
            info!("Stopped sync timer");
        }
        self.inner.persist()?;
        Ok(())
    }

    fn spawn_drain(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::clone(&self.inner);
                runtime.spawn(async move {
                    inner.drain().await;
                });
            }
            Err(_) => debug!("No async runtime; leaving record for the next drain"),
        }
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.handle.abort();
        }
    }
}

impl QueueInner {
    async fn drain(&self) -> DrainOutcome {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync drain already in progress");
            return DrainOutcome::AlreadyRunning;
        }
        let _guard = DrainGuard(&self.draining);

        let batch = self.eligible_batch();
        let mut report = DrainReport::default();
        let mut failed_rows: HashSet<(String, String)> = HashSet::new();

        for record in batch {
            let row = (record.table.clone(), record.id.clone());
            if failed_rows.contains(&row) {
                report.deferred += 1;
                continue;
            }

            report.attempted += 1;
            match self.deliver(&record).await {
                Ok(()) => {
                    self.mark(record.seq, None);
                    report.succeeded += 1;
                }
                Err(e) => {
                    let retries = self.mark(record.seq, Some(&e));
                    warn!(
                        table = %record.table,
                        id = %record.id,
                        operation = %record.operation,
                        retries,
                        error = %e,
                        "Sync delivery failed"
                    );
                    report.failed += 1;
                    failed_rows.insert(row);
                }
            }
        }

        report.dropped = self.prune();
        // persist() logs and counts its own failures; the queue stays usable in memory
        let _ = self.persist();

        if report.attempted > 0 || report.dropped > 0 {
            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                deferred = report.deferred,
                dropped = report.dropped,
                "Sync drain finished"
            );
        }
        DrainOutcome::Completed(report)
    }

    /// Records to attempt this pass. Failed records re-enter `pending` here.
    fn eligible_batch(&self) -> Vec<SyncRecord> {
        let max_retries = self.config.max_retries;
        let mut records = self.records.lock();
        records
            .iter_mut()
            .filter(|r| r.sync_status != SyncStatus::Completed && r.retries < max_retries)
            .map(|r| {
                r.sync_status = SyncStatus::Pending;
                r.clone()
            })
            .collect()
    }

    async fn deliver(&self, record: &SyncRecord) -> Result<(), SyncError> {
        let timeout = self.config.request_timeout();
        let call = async {
            match record.operation {
                SyncOperation::Insert | SyncOperation::Update => match &record.payload {
                    Some(payload) => {
                        self.remote
                            .upsert(&record.table, &record.id, payload)
                            .await
                    }
                    None => Err(SyncError::MissingPayload {
                        table: record.table.clone(),
                        id: record.id.clone(),
                        operation: record.operation.to_string(),
                    }),
                },
                SyncOperation::Delete => self.remote.delete(&record.table, &record.id).await,
            }
        };
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(timeout)),
        }
    }

    /// Record a delivery outcome; returns the record's retry count afterwards.
    fn mark(&self, seq: u64, failure: Option<&SyncError>) -> u32 {
        let mut records = self.records.lock();
        let Some(record) = records.iter_mut().find(|r| r.seq == seq) else {
            return 0;
        };
        match failure {
            None => record.sync_status = SyncStatus::Completed,
            Some(_) => {
                record.sync_status = SyncStatus::Failed;
                record.retries += 1;
            }
        }
        record.retries
    }

    /// Remove completed records and records out of retries. Returns how many were dropped.
    fn prune(&self) -> usize {
        let max_retries = self.config.max_retries;
        let mut exhausted = Vec::new();
        self.records.lock().retain(|r| {
            if r.sync_status == SyncStatus::Completed {
                false
            } else if r.retries >= max_retries {
                exhausted.push(r.clone());
                false
            } else {
                true
            }
        });

        for record in &exhausted {
            error!(
                table = %record.table,
                id = %record.id,
                operation = %record.operation,
                retries = record.retries,
                "Dropping sync record after exhausting retries"
            );
        }
        let count = exhausted.len();
        if count > 0 {
            self.dropped_total.fetch_add(count, Ordering::Relaxed);
            self.dropped.lock().extend(exhausted);
        }
        count
    }

    fn persist(&self) -> Result<(), StorageError> {
        let _order = self.persist_lock.lock();
        let snapshot = {
            let records = self.records.lock();
            serde_json::to_string(&*records)
        };
        let result = snapshot
            .map_err(StorageError::from)
            .and_then(|json| self.storage.set(&self.config.storage_key, &json));
        if let Err(e) = &result {
            self.persist_failures.fetch_add(1, Ordering::Relaxed);
            error!(
                storage_key = %self.config.storage_key,
                error = %e,
                "Failed to persist sync queue; continuing in memory"
            );
        }
        result
    }
}
