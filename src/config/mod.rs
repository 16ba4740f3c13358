//! MLE Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./mle.yaml` (current directory - highest priority)
//! 2. `~/.config/thread-mle/mle.yaml` (user config directory)
//! 3. `/etc/thread-mle/mle.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority
//! files key by key, so a local file may set a single field without
//! restating the rest of its section.
//!
//! # YAML Structure
//!
//! The YAML structure mirrors the sysctl-style paths used in field docs.
//! For example, `mle.router.leader_weight` corresponds to:
//!
//! ```yaml
//! mle:
//!   router:
//!     leader_weight: 64
//! ```

mod mle;
mod network;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use mle::{AdvertiseConfig, AttachConfig, ChildConfig, MleConfig, RouterConfig};
pub use network::{NetworkConfig, SecurityConfig};

/// Default config filename.
const CONFIG_FILENAME: &str = "mle.yaml";

/// Config directory name under `/etc` and the user config dir.
const CONFIG_DIRNAME: &str = "thread-mle";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// MLE behaviour (`mle.*`).
    #[serde(default)]
    pub mle: MleConfig,

    /// Key material (`security.*`).
    #[serde(default)]
    pub security: SecurityConfig,

    /// Network parameters (`network.*`).
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Config {
    /// Create a configuration with every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded contains
    /// the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut merged = Value::Mapping(Default::default());
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let value = Self::read_value(path)?;
                merge_values(&mut merged, value);
                loaded_paths.push(path.clone());
            }
        }

        let config = match loaded_paths.last() {
            Some(last) => serde_yaml::from_value(merged).map_err(|e| ConfigError::ParseYaml {
                path: last.clone(),
                source: e,
            })?,
            None => Config::default(),
        };
        config.validate()?;
        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let value = Self::read_value(path)?;
        let config: Config = serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn read_value(path: &Path) -> Result<Value, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let value: Value = serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })?;
        // An empty file parses as null.
        Ok(match value {
            Value::Null => Value::Mapping(Default::default()),
            v => v,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc").join(CONFIG_DIRNAME).join(CONFIG_FILENAME));

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(CONFIG_DIRNAME).join(CONFIG_FILENAME));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Check values serde cannot express as types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.security.network_key_bytes()?;
        self.network.ext_pan_id_bytes()?;
        if self.mle.max_children > crate::address::MAX_CHILD_ID as usize {
            return Err(ConfigError::InvalidValue {
                field: "mle.max_children",
                reason: format!("at most {} children", crate::address::MAX_CHILD_ID),
            });
        }
        if !(-1..=1).contains(&self.mle.router.parent_priority) {
            return Err(ConfigError::InvalidValue {
                field: "mle.router.parent_priority",
                reason: "must be -1, 0 or 1".to_string(),
            });
        }
        if self.mle.advertise.imin_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "mle.advertise.imin_ms",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Deep-merge `overlay` into `base`: mappings merge key by key, anything
/// else replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
