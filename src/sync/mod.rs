//! Local Mutation Sync
//!
//! Local writes are recorded as [`SyncRecord`]s, persisted as one JSON list in a
//! [`storage::LocalStorage`], and delivered to a [`remote::RemoteStore`] by the
//! [`queue::SyncQueue`] with bounded retries.

pub mod queue;
pub mod remote;
pub mod storage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub use queue::{DrainOutcome, DrainReport, SyncQueue};

/// Remote operation a record replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Insert,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn needs_payload(&self) -> bool {
        !matches!(self, SyncOperation::Delete)
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncOperation::Insert => "insert",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        })
    }
}

/// pending -> completed (pruned), or pending -> failed -> pending ... -> dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Completed,
    Failed,
}

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Local position in the queue; never sent to the remote
    #[serde(default)]
    pub seq: u64,
    pub table: String,
    pub id: String,
    pub operation: SyncOperation,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub retries: u32,
}

impl SyncRecord {
    /// Key of the remote row this record writes.
    pub fn row_key(&self) -> (&str, &str) {
        (&self.table, &self.id)
    }
}

/// Queue counters for observability. `completed` is always 0: completed records
/// are pruned at the end of each drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub pending: usize,
    pub failed: usize,
    pub completed: usize,
    pub total: usize,
    /// Records removed after exhausting their retries since the queue was opened
    pub dropped: usize,
    pub persist_failures: u64,
    pub draining: bool,
}
