//! Configuration Loader
//!
//! Environment-aware loading: a base TOML file, an optional
//! `<name>.<environment>.toml` overlay next to it, then `SOFT_DELETE_*`
//! environment variables (`__` separates nested keys).

use super::error::ConfigResult;
use super::SoftDeleteConfig;
use crate::constants::ENV_PREFIX;
use ::config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_CONFIG_FILE: &str = "config/soft_delete.toml";

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: SoftDeleteConfig,
    environment: String,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from the default path
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_path(PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration from a specific base file
    pub fn load_from_path(path: impl Into<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_with_sources(path.into(), &environment, None)
    }

    /// Load with an explicit environment name and an explicit variable map
    /// instead of the process environment. Used by tests so they never touch
    /// global process state.
    pub fn load_with_sources(
        config_path: PathBuf,
        environment: &str,
        variables: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        debug!(
            environment = %environment,
            path = %config_path.display(),
            "Loading soft delete configuration"
        );

        let overlay_path = Self::overlay_path(&config_path, environment);

        let settings = Config::builder()
            .add_source(File::from(config_path.as_path()).required(false))
            .add_source(File::from(overlay_path.as_path()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("bypass_operations")
                    .source(variables),
            )
            .build()?;

        let config: SoftDeleteConfig = settings.try_deserialize()?;
        config.validate()?;

        debug!(
            default_active_attribute = %config.default_active_attribute,
            bypass_operations = ?config.bypass_operations,
            "Soft delete configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_path,
        }))
    }

    pub fn config(&self) -> &SoftDeleteConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// `config/soft_delete.toml` + `test` -> `config/soft_delete.test.toml`
    fn overlay_path(base: &Path, environment: &str) -> PathBuf {
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "soft_delete".to_string());
        base.with_file_name(format!("{stem}.{environment}.toml"))
    }

    fn detect_environment() -> String {
        env::var("TASKER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
