//! Merge policy: every build starts from the serialized defaults so partial files
//! only override what they name.

pub mod service;

use crate::config::VayaConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

pub(crate) fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&VayaConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
