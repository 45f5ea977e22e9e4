//! Tracer configuration
//!
//! Every field has a default so a partial JSON document is enough.

use crate::error::{Result, ShadowError};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_SWEEP_INTERVAL: usize = 1024;
const DEFAULT_LOG_FILTER: &str = "info";

/// Configuration for one tracing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Number of registry insertions between sweeps of dead weak keys (0 = only on demand)
    pub sweep_interval: usize,

    /// Render and log the provenance tree of every local/class-var write at `trace` level
    pub dump_on_write: bool,

    /// Default `tracing` filter directive when `RUST_LOG` is unset
    pub log_filter: String,

    /// Which sources the host should instrument
    pub source_filter: SourceFilter,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            dump_on_write: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            source_filter: SourceFilter::default(),
        }
    }
}

impl TracerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: TracerConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading tracer configuration");
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Set the sweep interval
    pub fn with_sweep_interval(mut self, interval: usize) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Enable or disable tree dumps on writes
    pub fn with_dump_on_write(mut self, enabled: bool) -> Self {
        self.dump_on_write = enabled;
        self
    }

    /// Set the default log filter directive
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Replace the source filter
    pub fn with_source_filter(mut self, filter: SourceFilter) -> Self {
        self.source_filter = filter;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.log_filter.trim().is_empty() {
            return Err(ShadowError::Configuration(
                "log_filter must not be empty".to_string(),
            ));
        }
        if self
            .source_filter
            .excluded_infixes
            .iter()
            .any(|infix| infix.is_empty())
        {
            return Err(ShadowError::Configuration(
                "source_filter.excluded_infixes contains an empty entry, which would exclude every source"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Decides which sources receive instrumentation tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFilter {
    /// Reject any source whose name contains one of these
    pub excluded_infixes: Vec<String>,
    /// Reject sources with exactly these names
    pub excluded_names: Vec<String>,
    /// Reject synthetic sources, named like `(eval)`
    pub skip_synthetic: bool,
    /// Reject sources the host marks as internal
    pub skip_internal: bool,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            excluded_infixes: vec![
                "truffle/src/main/ruby".to_string(),
                "lib/ruby/truffle".to_string(),
            ],
            excluded_names: vec!["main".to_string(), "context".to_string()],
            skip_synthetic: true,
            skip_internal: true,
        }
    }
}

impl SourceFilter {
    /// A filter that accepts every source.
    pub fn accept_all() -> Self {
        Self {
            excluded_infixes: Vec::new(),
            excluded_names: Vec::new(),
            skip_synthetic: false,
            skip_internal: false,
        }
    }

    pub fn accepts(&self, source_name: &str, internal: bool) -> bool {
        if self
            .excluded_infixes
            .iter()
            .any(|infix| source_name.contains(infix.as_str()))
        {
            return false;
        }
        if self.excluded_names.iter().any(|name| name == source_name) {
            return false;
        }
        if self.skip_synthetic && source_name.starts_with('(') {
            return false;
        }
        !(self.skip_internal && internal)
    }
}
