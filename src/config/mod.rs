//! Configuration for the MediaFlow runtime
//!
//! Two kinds of files are handled here:
//! - [`RuntimeConfig`]: process-wide settings (module directories, default
//!   latency and pipe policy, failure policy, log filter), stored as TOML
//! - [`PipelineDescription`]: one pipeline graph, stored as TOML or JSON
//!
//! # App Data Location
//!
//! Dynamic modules are looked up by default in the platform data directory:
//! - **Linux**: `~/.local/share/dev.mediaflow.mediaflow-rs/modules/`
//! - **macOS**: `~/Library/Application Support/dev.mediaflow.mediaflow-rs/modules/`
//! - **Windows**: `%APPDATA%\dev.mediaflow.mediaflow-rs\modules\`
//!
//! The runtime config itself lives in the platform config directory under
//! the same application id, as `config.toml`.

pub mod description;

pub use description::{Endpoint, LinkDescription, NodeDescription, PipelineDescription};

use crate::error::{MediaFlowError, Result};
use crate::pipeline::PipePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.mediaflow.mediaflow-rs";

/// Runtime config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default per-node latency budget in milliseconds
pub const DEFAULT_LATENCY_MS: u64 = 200;

/// Name of the base parameter holding a node's latency in milliseconds
pub const LATENCY_PARAM: &str = "latency";

/// Name of the base parameter asking a node to end the pipeline when it exits
pub const STOP_ON_EXIT_PARAM: &str = "_stop_pipeline_on_exit";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Default location of `config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

fn default_module_dirs() -> Vec<PathBuf> {
    app_data_dir()
        .map(|p| vec![p.join("modules")])
        .unwrap_or_default()
}

fn default_latency_ms() -> u64 {
    DEFAULT_LATENCY_MS
}

// ==================== Runtime Config ====================

/// Process-wide runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directories scanned for dynamic modules at startup
    #[serde(default = "default_module_dirs")]
    pub module_dirs: Vec<PathBuf>,

    /// Latency budget for nodes that don't set `latency` themselves
    #[serde(default = "default_latency_ms")]
    pub default_latency_ms: u64,

    /// Policy for links that don't declare one
    #[serde(default)]
    pub default_pipe: PipePolicy,

    /// Cancel the whole pipeline when any node fails
    #[serde(default)]
    pub stop_on_node_failure: bool,

    /// Tracing filter directive, overridden by `RUST_LOG`
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            module_dirs: default_module_dirs(),
            default_latency_ms: DEFAULT_LATENCY_MS,
            default_pipe: PipePolicy::default(),
            stop_on_node_failure: false,
            log_filter: None,
        }
    }
}

impl RuntimeConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MediaFlowError::Configuration(format!("Failed to read config {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| e.with_context(format!("Failed to parse config {:?}", path)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load runtime config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MediaFlowError::Configuration(format!("Failed to create config directory: {}", e))
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| {
            MediaFlowError::Configuration(format!("Failed to write config {:?}: {}", path, e))
        })
    }

    pub fn default_latency(&self) -> Duration {
        Duration::from_millis(self.default_latency_ms.max(1))
    }
}
