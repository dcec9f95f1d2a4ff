//! Debounce configuration
//!
//! Loaded from TOML:
//! ```toml
//! delay_ms = 500
//! max_batch = 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `delay_ms` (one hour)
pub const MAX_DELAY_MS: u64 = 3_600_000;

/// Debounce configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Default quiet period in milliseconds (default: 500)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Deliver a coalesced batch as soon as it holds this many events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch: Option<usize>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML or has wrong field types
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// `delay_ms` outside 1..=MAX_DELAY_MS
    #[error("delay_ms must be between 1 and {max}, got {0}", max = MAX_DELAY_MS)]
    InvalidDelay(u64),

    /// `max_batch` of zero
    #[error("max_batch must be at least 1")]
    InvalidMaxBatch,
}

impl DebounceConfig {
    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delay_ms == 0 || self.delay_ms > MAX_DELAY_MS {
            return Err(ConfigError::InvalidDelay(self.delay_ms));
        }
        if self.max_batch == Some(0) {
            return Err(ConfigError::InvalidMaxBatch);
        }
        Ok(())
    }

    /// Default delay as a `Duration`
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_batch: None,
        }
    }
}

fn default_delay_ms() -> u64 {
    500
}
