//! Configuration System
//!
//! Hierarchical configuration for the `chrc` build driver, loaded from:
//! - chrc.toml (project configuration)
//! - chrc.local.toml (git-ignored local overrides)
//! - Environment variables (CHRC_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # chrc.toml
//! [build]
//! overwrite = "timestamp"
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! CHRC_BUILD__OVERWRITE=always
//! CHRC_LOGGING__LEVEL=trace
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::compile::OverwritePolicy;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Build driver configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// When to replace existing outputs
    #[serde(default)]
    pub overwrite: OverwritePolicy,

    /// Directory for compiled outputs (defaults to next to the source)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. chrc.toml (base configuration)
    /// 2. chrc.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (CHRC_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("chrc.toml"))
            .merge(Toml::file("chrc.local.toml"))
            .merge(Env::prefixed("CHRC_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHRC_").split("__"))
            .extract()
    }
}
