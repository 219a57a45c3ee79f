//! Bridge Configuration (causeway.toml)
//!
//! Describes the native library the bridge should attach to: an explicit
//! path, or a short name resolved against search paths with platform-specific
//! naming conventions.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bridge configuration from causeway.toml
///
/// ```toml
/// [library]
/// name = "acme_sdk"
/// search-paths = ["/opt/acme/lib"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Native library section
    #[serde(default)]
    pub library: LibraryConfig,
}

/// Native library location settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    /// Short library name, resolved with platform prefix/extension
    /// (e.g. "acme_sdk" -> "libacme_sdk.so" on Linux)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Explicit path to the library file; takes precedence over `name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Extra directories searched before the platform defaults
    #[serde(default, rename = "search-paths")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

impl BridgeConfig {
    /// Configuration for a library identified by short name
    pub fn for_library(name: impl Into<String>) -> Self {
        Self {
            library: LibraryConfig {
                name: Some(name.into()),
                path: None,
                search_paths: Vec::new(),
            },
        }
    }

    /// Configuration pointing at an explicit library file
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library: LibraryConfig {
                name: None,
                path: Some(path.into()),
                search_paths: Vec::new(),
            },
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: BridgeConfig =
            toml::from_str(&contents).map_err(|error| ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// A usable configuration names the library one way or the other.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.library.name.is_none() && self.library.path.is_none() {
            return Err(ConfigError::ValidationError(
                "either library.name or library.path must be set".to_string(),
            ));
        }

        if let Some(name) = &self.library.name {
            if name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "library.name".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
            if name.contains(std::path::MAIN_SEPARATOR) {
                return Err(ConfigError::InvalidValue {
                    field: "library.name".to_string(),
                    reason: "must be a short name, not a path (use library.path)".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Merge another configuration over this one (other wins per field)
    pub fn merge(mut self, other: BridgeConfig) -> Self {
        if other.library.name.is_some() {
            self.library.name = other.library.name;
        }
        if other.library.path.is_some() {
            self.library.path = other.library.path;
        }
        if !other.library.search_paths.is_empty() {
            self.library.search_paths = other.library.search_paths;
        }
        self
    }
}
