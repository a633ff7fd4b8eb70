//! Binding configuration via `tether.toml`
//!
//! A store is opened with a [`BindingConfig`]. The config can be built in code
//! or read from a TOML file; a commented default file can be written on first
//! use and edited afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tether_core::{Error, Result};

/// Config file name used by embedders that keep one next to their data.
pub const CONFIG_FILE_NAME: &str = "tether.toml";

/// Default first-phase buffer capacity of the variable-length protocol.
pub const DEFAULT_STRING_BUFFER_CAPACITY: usize = 128;

/// Binding configuration loaded from `tether.toml`.
///
/// # Example
///
/// ```toml
/// # Native store identifier
/// path = "default.tether"
///
/// # First-phase buffer size (bytes) for string and binary reads
/// string_buffer_capacity = 128
///
/// # Deliver change notifications right after a write scope commits
/// auto_refresh = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Native store identifier. Stores opened on the same path share data.
    #[serde(default = "default_path")]
    pub path: String,
    /// First-phase buffer capacity in bytes.
    #[serde(default = "default_string_buffer_capacity")]
    pub string_buffer_capacity: usize,
    /// Refresh the store after every committed write scope.
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
}

fn default_path() -> String {
    "default.tether".to_string()
}

fn default_string_buffer_capacity() -> usize {
    DEFAULT_STRING_BUFFER_CAPACITY
}

fn default_auto_refresh() -> bool {
    true
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            string_buffer_capacity: default_string_buffer_capacity(),
            auto_refresh: default_auto_refresh(),
        }
    }
}

impl BindingConfig {
    /// Default config with a different store path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Check field values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty path or a zero buffer capacity.
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::Config("store path must not be empty".to_string()));
        }
        if self.string_buffer_capacity == 0 {
            return Err(Error::Config(
                "string_buffer_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tether binding configuration
#
# Native store identifier. Stores opened on the same path share data.
path = "default.tether"

# First-phase buffer size in bytes for string and binary reads.
# Values longer than this take a second native call.
string_buffer_capacity = 128

# Deliver pending change notifications right after a write scope commits.
# When false, call Store::refresh explicitly.
auto_refresh = true
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: BindingConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
