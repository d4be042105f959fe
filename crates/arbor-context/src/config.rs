//! Configuration shared by every context of a tree.

use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Context tree configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Log level used when `RUST_LOG` is not set (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit a trace event for every node visited by an axis dispatch
    #[serde(default)]
    pub trace_dispatch: bool,

    /// Emit debug events for lifecycle transitions
    #[serde(default = "default_trace_lifecycle")]
    pub trace_lifecycle: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_trace_lifecycle() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            trace_dispatch: false,
            trace_lifecycle: default_trace_lifecycle(),
        }
    }
}

impl ContextConfig {
    /// Parse configuration from YAML. Missing fields take their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ContextError::Config(e.to_string()))
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to load config: {}", e);
                Self::default()
            }
        }
    }
}
