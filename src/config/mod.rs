//! Configuration management
//!
//! A hierarchical, versioned key/value store persisted as TOML, plus the
//! project directories used for the configuration and log files.

mod tree;
mod versioned;

pub use tree::ConfigTree;
pub use versioned::{
    config_version, shared, SharedConfig, VersionedOptions, ERROR_READING_CONFIG_VERSION,
    NO_CONFIG_VERSION,
};

use std::path::PathBuf;

use anyhow::{Context, Result};

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "zaproxy", "zap-network")
        .context("Failed to determine project directories")
}

/// Get default configuration file path
pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Get data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}
