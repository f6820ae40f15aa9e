//! Configuration module
//!
//! Handles harness settings and where they live on disk

mod settings;

pub use settings::{ConfigError, HarnessConfig, SuiteConfig, TimingConfig};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "picoc", "picoc-harness").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
