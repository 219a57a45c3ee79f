//! Configuration Loader
//!
//! Loads and merges bridge configuration from multiple sources with proper
//! precedence:
//! 1. Global config (~/.causeway/config.toml) - lowest priority
//! 2. Project config (./causeway.toml) - overrides global
//! 3. Environment variables (CAUSEWAY_*) - highest priority

use crate::bridge::BridgeConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "causeway.toml";

/// Environment variable naming the library (short name)
pub const ENV_LIBRARY: &str = "CAUSEWAY_LIBRARY";

/// Environment variable pointing at an explicit library file
pub const ENV_LIBRARY_PATH: &str = "CAUSEWAY_LIBRARY_PATH";

/// Environment variable with extra search directories (PATH-style separator)
pub const ENV_SEARCH_PATHS: &str = "CAUSEWAY_SEARCH_PATHS";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find causeway.toml, merges the global
    /// config underneath it, then applies environment overrides on top.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<BridgeConfig> {
        let global = self.load_global_config()?;
        let project = self.find_project_config(start_dir)?;

        let merged = match (global, project) {
            (Some(g), Some(p)) => g.merge(p),
            (Some(g), None) => g,
            (None, Some(p)) => p,
            (None, None) => BridgeConfig::default(),
        };

        Ok(merged.merge(Self::env_overrides()))
    }

    /// Load configuration from a specific file, with env overrides applied
    pub fn load_from_file(&self, path: &Path) -> ConfigResult<BridgeConfig> {
        let config = BridgeConfig::load_from_file(path)?;
        Ok(config.merge(Self::env_overrides()))
    }

    /// Find project configuration by walking up the directory tree
    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<Option<BridgeConfig>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);
            if config_path.exists() {
                return BridgeConfig::load_from_file(&config_path).map(Some);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok(None),
            }
        }
    }

    /// Load ~/.causeway/config.toml if present
    fn load_global_config(&self) -> ConfigResult<Option<BridgeConfig>> {
        let path = Self::global_config_path()?;
        if !path.exists() {
            return Ok(None);
        }
        BridgeConfig::load_from_file(&path).map(Some)
    }

    /// Path of the global configuration file
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".causeway").join("config.toml"))
    }

    /// Overrides assembled from CAUSEWAY_* environment variables
    fn env_overrides() -> BridgeConfig {
        let mut config = BridgeConfig::default();

        if let Ok(name) = env::var(ENV_LIBRARY) {
            if !name.is_empty() {
                config.library.name = Some(name);
            }
        }

        if let Ok(path) = env::var(ENV_LIBRARY_PATH) {
            if !path.is_empty() {
                config.library.path = Some(PathBuf::from(path));
            }
        }

        if let Ok(paths) = env::var(ENV_SEARCH_PATHS) {
            let parsed: Vec<PathBuf> = env::split_paths(&paths).collect();
            if !parsed.is_empty() {
                config.library.search_paths = parsed;
            }
        }

        config
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
