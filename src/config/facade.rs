//! Configuration loading entry points

use super::{merge, sources, CourierConfig};
use config::{Config, ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Builds a [`CourierConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global file, workspace files and `COURIER_*` variables.
    pub fn load(workspace_root: &Path) -> Result<CourierConfig, ConfigError> {
        let builder = merge::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = sources::environment::add_to_builder(builder);

        let config: CourierConfig = builder.build()?.try_deserialize()?;
        debug!(workspace_root = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load a single file on top of the defaults
    pub fn load_from_file(path: &Path) -> Result<CourierConfig, ConfigError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigError::Message(format!("Non UTF-8 config path: {:?}", path)))?;
        let config = merge::builder_with_defaults()?
            .add_source(File::with_name(path_str))
            .build()?;
        config.try_deserialize()
    }

    /// Defaults only
    pub fn default_config() -> Result<CourierConfig, ConfigError> {
        let config: Config = merge::builder_with_defaults()?.build()?;
        config.try_deserialize()
    }

    /// Location of the user-level config file, if one can be determined
    pub fn global_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }
}
