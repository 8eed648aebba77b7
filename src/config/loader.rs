// src/config/loader.rs

use std::path::{Path, PathBuf};

use crate::config::model::{Config, RawConfigFile};
use crate::config::validate::validate_config;
use crate::errors::{Result, SavepointError};
use crate::fs::{FileSystem, RealFileSystem};

/// Deserialize a config file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>, fs: &dyn FileSystem) -> Result<RawConfigFile> {
    let contents = fs.read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load and validate a config file from disk.
///
/// Relative repository paths resolve against the config file's directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config> {
    load_and_validate_with(path, &RealFileSystem)
}

pub fn load_and_validate_with(path: impl AsRef<Path>, fs: &dyn FileSystem) -> Result<Config> {
    let path = path.as_ref();
    let raw = load_from_path(path, fs)?;
    validate_config(raw, &config_base_dir(path), fs)
}

/// Parse TOML text directly (no file), resolving paths against `base_dir`.
pub fn parse_config(contents: &str, base_dir: &Path, fs: &dyn FileSystem) -> Result<Config> {
    let raw: RawConfigFile = toml::from_str(contents).map_err(SavepointError::from)?;
    validate_config(raw, base_dir, fs)
}

/// Directory relative repository paths are resolved against.
///
/// A bare filename like "Savepoint.toml" (parent = "") falls back to the
/// current working directory.
pub fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
