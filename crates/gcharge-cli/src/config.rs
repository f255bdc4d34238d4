//! # CLI Configuration Module
//!
//! Logging setup and file locations used by the `gcharge` binary.

use anyhow::{anyhow, Context, Result};
use gcharge_diagnostics::DiagnosticsConfig;
use gcharge_store::settings::SETTINGS_FILE;
use std::path::{Path, PathBuf};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "gcharge=info";

/// Directory name under the platform config directory
pub const APP_DIR: &str = "gcharge";

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Force debug output
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive for the workspace crates
    pub fn filter_directive(&self) -> String {
        if self.verbose {
            return "gcharge=debug".to_string();
        }
        match self.level.to_lowercase().as_str() {
            level @ ("trace" | "debug" | "info" | "warn" | "error") => format!("gcharge={}", level),
            _ => DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// `<config dir>/gcharge/settings.toml`
pub fn default_settings_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine the user configuration directory"))?;
    Ok(base.join(APP_DIR).join(SETTINGS_FILE))
}

/// Explicit path if given, otherwise the default location
pub fn resolve_settings_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_settings_path(),
    }
}

/// Diagnostics configuration from `path`, or the built-in defaults
pub fn load_diagnostics_config(path: Option<&Path>) -> Result<DiagnosticsConfig> {
    let config = match path {
        Some(path) => DiagnosticsConfig::from_file(path)
            .with_context(|| format!("Failed to load diagnostics config {}", path.display()))?,
        None => DiagnosticsConfig::default(),
    };
    config
        .validate()
        .context("Invalid diagnostics configuration")?;
    Ok(config)
}
