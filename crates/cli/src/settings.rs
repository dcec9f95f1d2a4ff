//! Effective settings: config file values with command-line overrides

use anyhow::{Context, Result};
use debounce::DebounceConfig;
use std::path::Path;

/// How input lines are debounced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print only the last line of each burst
    Latest,
    /// Print the last line of each burst per key (first token of the line)
    Keyed,
    /// Print each burst as one joined line
    Batch,
}

/// Resolved settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: DebounceConfig,
    pub mode: Mode,
    /// Joins the items of a batch in `Mode::Batch`
    pub separator: String,
}

impl Settings {
    /// Load the config file (if any) and apply flag overrides on top
    pub fn resolve(
        config_path: Option<&Path>,
        delay_ms: Option<u64>,
        max_batch: Option<usize>,
        mode: Mode,
        separator: String,
    ) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => DebounceConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => DebounceConfig::default(),
        };

        // Flags win over the file
        if let Some(delay_ms) = delay_ms {
            config.delay_ms = delay_ms;
        }
        if let Some(max_batch) = max_batch {
            config.max_batch = Some(max_batch);
        }

        config.validate().context("Invalid debounce settings")?;

        Ok(Self {
            config,
            mode,
            separator,
        })
    }
}
