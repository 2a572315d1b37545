//! Remote store
//!
//! The minimal contract the sync queue delivers to: upsert a row keyed by id, or
//! delete a row by id.

use crate::error::SyncError;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

pub const API_KEY_ENV: &str = "VAYA_REMOTE_API_KEY";

/// Remote table contract
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upsert(&self, table: &str, id: &str, row: &Value) -> Result<(), SyncError>;
    async fn delete(&self, table: &str, id: &str) -> Result<(), SyncError>;
}

/// Remote store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the PostgREST-compatible service; `None` disables delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// API key; falls back to `VAYA_REMOTE_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_people_table")]
    pub people_table: String,

    #[serde(default = "default_relationships_table")]
    pub relationships_table: String,
}

fn default_people_table() -> String {
    "family_members".to_string()
}

fn default_relationships_table() -> String {
    "family_relationships".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            people_table: default_people_table(),
            relationships_table: default_relationships_table(),
        }
    }
}

impl RemoteConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

/// PostgREST-compatible REST client (`/rest/v1/{table}`).
pub struct RestRemoteStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RestRemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::NotConfigured(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    pub fn from_config(config: &RemoteConfig, timeout: Duration) -> Result<Self, SyncError> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| SyncError::NotConfigured("remote.url is not set".to_string()))?;
        Self::new(url, config.resolved_api_key(), timeout)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn check(
        &self,
        response: Result<reqwest::Response, reqwest::Error>,
        table: &str,
        id: &str,
    ) -> Result<(), SyncError> {
        let response = response.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(self.timeout)
            } else {
                SyncError::Remote {
                    table: table.to_string(),
                    id: id.to_string(),
                    message: e.to_string(),
                }
            }
        })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote {
                table: table.to_string(),
                id: id.to_string(),
                message: format!("HTTP {}: {}", status, body),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn upsert(&self, table: &str, id: &str, row: &Value) -> Result<(), SyncError> {
        let body = with_id(row, id);
        debug!(table, id, "Upserting remote row");
        let request = self
            .authorize(self.client.post(self.table_url(table)))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body);
        self.check(request.send().await, table, id).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), SyncError> {
        debug!(table, id, "Deleting remote row");
        let request = self
            .authorize(self.client.delete(self.table_url(table)))
            .query(&[("id", format!("eq.{}", id))]);
        self.check(request.send().await, table, id).await
    }
}

/// Rows are keyed by `id`; make sure the body carries it.
fn with_id(row: &Value, id: &str) -> Value {
    match row {
        Value::Object(map) => {
            let mut map = map.clone();
            map.insert("id".to_string(), Value::String(id.to_string()));
            Value::Object(map)
        }
        other => {
            let mut map = Map::new();
            map.insert("id".to_string(), Value::String(id.to_string()));
            map.insert("value".to_string(), other.clone());
            Value::Object(map)
        }
    }
}

/// In-process tables: table -> id -> row.
#[derive(Default)]
pub struct MemoryRemoteStore {
    tables: Mutex<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, table: &str, id: &str) -> Option<Value> {
        self.tables.lock().get(table).and_then(|t| t.get(id).cloned())
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.lock().values().all(BTreeMap::is_empty)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(&self, table: &str, id: &str, row: &Value) -> Result<(), SyncError> {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), with_id(row, id));
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), SyncError> {
        if let Some(rows) = self.tables.lock().get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }
}

/// Stands in when no remote is configured. Every call fails with
/// `NotConfigured`; queues built on it should not drain.
pub struct UnconfiguredRemote;

#[async_trait]
impl RemoteStore for UnconfiguredRemote {
    async fn upsert(&self, _table: &str, _id: &str, _row: &Value) -> Result<(), SyncError> {
        Err(SyncError::NotConfigured("remote.url is not set".to_string()))
    }

    async fn delete(&self, _table: &str, _id: &str) -> Result<(), SyncError> {
        Err(SyncError::NotConfigured("remote.url is not set".to_string()))
    }
}
