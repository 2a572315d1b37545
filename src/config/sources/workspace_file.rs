//! Workspace config files: `vaya.toml`, then the uncommitted `vaya.local.toml`.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::Path;

pub const WORKSPACE_FILE: &str = "vaya.toml";
pub const WORKSPACE_LOCAL_FILE: &str = "vaya.local.toml";

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder
        .add_source(File::from(workspace_root.join(WORKSPACE_FILE)).required(false))
        .add_source(File::from(workspace_root.join(WORKSPACE_LOCAL_FILE)).required(false)))
}
