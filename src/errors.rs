// src/errors.rs

use thiserror::Error;

/// Errors surfaced by config loading and the orchestrator's control API.
///
/// Per-repository failures during checkpointing are not errors at this level;
/// they end up in the repository's snapshot as `last_error`.
#[derive(Error, Debug)]
pub enum SavepointError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Unknown repository: {0}")]
    UnknownRepository(String),

    #[error("Repository is not running: {0}")]
    RepositoryStopped(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SavepointError>;
