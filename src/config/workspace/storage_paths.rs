//! StorageConfig and path resolution for workspace storage.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_DATA_PATH: &str = ".vaya/data";

fn default_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_PATH)
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database holding family graphs and the sync queue (relative to the
    /// workspace root). The default lives under the XDG data directory instead.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
}

impl StorageConfig {
    pub fn resolve_path(&self, workspace_root: &Path) -> Result<PathBuf, ApiError> {
        if self.data_path == Path::new(DEFAULT_DATA_PATH) {
            Ok(xdg::workspace_data_dir(workspace_root)?.join("data"))
        } else if self.data_path.is_absolute() {
            Ok(self.data_path.clone())
        } else {
            Ok(workspace_root.join(&self.data_path))
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_relative_path_is_workspace_relative() {
        let config = StorageConfig {
            data_path: PathBuf::from("db"),
        };
        let resolved = config.resolve_path(Path::new("/srv/family")).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/family/db"));
    }

    #[test]
    fn absolute_path_is_kept() {
        let config = StorageConfig {
            data_path: PathBuf::from("/var/lib/vaya"),
        };
        let resolved = config.resolve_path(Path::new("/srv/family")).unwrap();
        assert_eq!(resolved, PathBuf::from("/var/lib/vaya"));
    }
}
