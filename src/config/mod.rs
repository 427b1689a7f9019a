//! # Soft Delete Configuration
//!
//! Process-level settings for the scope registry and lifecycle controller.
//! Values come from an optional TOML file, an optional per-environment
//! overlay and `SOFT_DELETE_*` environment variables, in that order of
//! precedence (later wins).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_soft_delete::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let attribute = &manager.config().default_active_attribute;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{DEFAULT_ACTIVE_ATTRIBUTE, DEFAULT_BYPASS_OPERATIONS};
use crate::lifecycle::read::ReadKind;
use crate::scopes::ActiveAttribute;
use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/soft_delete.toml`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SoftDeleteConfig {
    /// Liveness attribute used when a registration does not name one
    pub default_active_attribute: String,

    /// Read kinds permitted to run with the active scope suspended
    pub bypass_operations: Vec<ReadKind>,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `tasker_soft_delete=debug`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for SoftDeleteConfig {
    fn default() -> Self {
        Self {
            default_active_attribute: DEFAULT_ACTIVE_ATTRIBUTE.to_string(),
            bypass_operations: DEFAULT_BYPASS_OPERATIONS.to_vec(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SoftDeleteConfig {
    /// Validate values that serde cannot check on its own
    pub fn validate(&self) -> ConfigResult<()> {
        if let Err(err) = ActiveAttribute::parse(&self.default_active_attribute) {
            return Err(ConfigurationError::invalid_value(
                "default_active_attribute",
                self.default_active_attribute.clone(),
                err.to_string(),
            ));
        }

        if self.bypass_operations.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "bypass_operations",
                "[]",
                "at least one read kind must be allowed to bypass the active scope",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "logging.level",
                "",
                "log level directive must not be empty",
            ));
        }

        Ok(())
    }

    /// The configured default attribute, parsed
    pub fn default_attribute(&self) -> ConfigResult<ActiveAttribute> {
        ActiveAttribute::parse(&self.default_active_attribute).map_err(|err| {
            ConfigurationError::invalid_value(
                "default_active_attribute",
                self.default_active_attribute.clone(),
                err.to_string(),
            )
        })
    }
}
