//! Cell configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a valid
//! configuration. Unknown keys are rejected.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event};
use crate::storage::{StoreOptions, DEFAULT_SCRATCH_SUFFIX};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables for one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellConfig {
    /// Suffix appended to the file name for the scratch file
    #[serde(default = "default_scratch_suffix")]
    pub scratch_suffix: String,

    /// Fsync the parent directory after each rename
    #[serde(default = "default_sync_directory")]
    pub sync_directory: bool,

    /// Live subscriber count above which a warning is logged
    #[serde(default = "default_subscriber_warn_threshold")]
    pub subscriber_warn_threshold: usize,
}

fn default_scratch_suffix() -> String {
    DEFAULT_SCRATCH_SUFFIX.to_string()
}
fn default_sync_directory() -> bool {
    true
}
fn default_subscriber_warn_threshold() -> usize {
    1024
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            scratch_suffix: default_scratch_suffix(),
            sync_directory: default_sync_directory(),
            subscriber_warn_threshold: default_subscriber_warn_threshold(),
        }
    }
}

impl CellConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config = Self::from_json(&content)?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", &path.display().to_string()),
                ("scratch_suffix", &config.scratch_suffix),
                ("sync_directory", &config.sync_directory.to_string()),
            ],
        );

        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: CellConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.scratch_suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "scratch_suffix must not be empty".to_string(),
            ));
        }

        if self
            .scratch_suffix
            .chars()
            .any(|c| c == '/' || std::path::is_separator(c))
        {
            return Err(ConfigError::Invalid(format!(
                "scratch_suffix '{}' must not contain a path separator",
                self.scratch_suffix
            )));
        }

        if self.subscriber_warn_threshold == 0 {
            return Err(ConfigError::Invalid(
                "subscriber_warn_threshold must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Options for the atomic file store
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            scratch_suffix: self.scratch_suffix.clone(),
            sync_directory: self.sync_directory,
        }
    }
}
