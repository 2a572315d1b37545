//! Configuration
//!
//! `VayaConfig` is assembled from layered sources by [`merge::service::MergeService`]:
//! built-in defaults, the global XDG file, workspace files, then `VAYA__*`
//! environment variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;
pub mod workspace;

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;
pub use workspace::storage_paths::StorageConfig;

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::sync::queue::SyncConfig;
use crate::sync::remote::RemoteConfig;
use serde::{Deserialize, Serialize};

/// Graph behavior settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Reject relationships whose endpoints are not people in the graph
    #[serde(default)]
    pub strict_relationships: bool,
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VayaConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VayaConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        self.sync.validate().map_err(ApiError::ConfigError)?;
        if self.remote.people_table.trim().is_empty()
            || self.remote.relationships_table.trim().is_empty()
        {
            return Err(ApiError::ConfigError(
                "remote table names must not be empty".to_string(),
            ));
        }
        if let Some(url) = &self.remote.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ApiError::ConfigError(format!(
                    "remote.url must start with http:// or https:// (got '{}')",
                    url
                )));
            }
        }
        Ok(())
    }
}
