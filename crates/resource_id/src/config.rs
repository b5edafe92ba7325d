//! Registry configuration

use crate::errors::{ResourceIdError, Result};
use crate::uri::is_standard_uri;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub const ENV_DEFAULT_PREFIX: &str = "RESOURCE_ID_DEFAULT_PREFIX";
pub const ENV_DEFAULT_AUTHORITY: &str = "RESOURCE_ID_DEFAULT_AUTHORITY";
pub const ENV_WARN_ON_REBIND: &str = "RESOURCE_ID_WARN_ON_REBIND";
pub const ENV_SWEEP_THRESHOLD: &str = "RESOURCE_ID_SWEEP_THRESHOLD";

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Prefix of generated ids
    pub default_prefix: String,
    /// Authority used when formatting ids as standard URIs
    pub default_authority: String,
    /// Emit rebinding conflict notices at all
    pub warn_on_rebind: bool,
    /// Inserts between two sweeps of dead rows (the effective interval also
    /// grows with the objects still live after the last sweep)
    pub sweep_threshold: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_prefix: "smi:local".to_string(),
            default_authority: "local".to_string(),
            warn_on_rebind: true,
            sweep_threshold: 1024,
        }
    }
}

impl RegistryConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults with overrides from `lookup` applied. Falls back to the
    /// defaults when the overridden configuration does not validate.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup);
        match config.validate() {
            Ok(()) => config,
            Err(err) => {
                warn!("Ignoring resource id overrides, using defaults: {}", err);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RegistryConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading resource id configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source. Values that fail to parse
    /// are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup(ENV_DEFAULT_PREFIX) {
            self.default_prefix = prefix;
        }

        if let Some(authority) = lookup(ENV_DEFAULT_AUTHORITY) {
            self.default_authority = authority;
        }

        if let Some(value) = lookup(ENV_WARN_ON_REBIND) {
            match value.parse() {
                Ok(flag) => self.warn_on_rebind = flag,
                Err(_) => warn!("Ignoring {}={:?}: expected a boolean", ENV_WARN_ON_REBIND, value),
            }
        }

        if let Some(value) = lookup(ENV_SWEEP_THRESHOLD) {
            match value.parse() {
                Ok(threshold) => self.sweep_threshold = threshold,
                Err(_) => warn!(
                    "Ignoring {}={:?}: expected an unsigned integer",
                    ENV_SWEEP_THRESHOLD, value
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_threshold == 0 {
            return Err(ResourceIdError::Config(
                "sweep_threshold must be greater than zero".into(),
            ));
        }

        if !is_standard_uri(&format!("smi:{}/probe", self.default_authority)) {
            return Err(ResourceIdError::Config(format!(
                "default_authority {:?} cannot form a standard resource URI",
                self.default_authority
            )));
        }

        Ok(())
    }
}
