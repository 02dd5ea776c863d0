//! Platform-specific config directory helpers.
//!
//! Uses the `dirs` crate to resolve platform-appropriate directories:
//! - Linux:   `~/.config/doctrack/`
//! - macOS:   `~/Library/Application Support/doctrack/`
//!
//! `DOCTRACK_CONFIG` names a config file directly and wins over both.

use std::path::PathBuf;

use crate::error::DocError;

pub const CONFIG_ENV: &str = "DOCTRACK_CONFIG";

/// Get the doctrack config directory. It is not created.
pub fn doc_config_dir() -> Result<PathBuf, DocError> {
    let base = dirs::config_dir()
        .ok_or_else(|| DocError::Config("Could not determine config directory".into()))?;
    Ok(base.join("doctrack"))
}

/// Path of the config file to read.
pub fn config_file() -> Result<PathBuf, DocError> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(doc_config_dir()?.join("config.toml")),
    }
}
