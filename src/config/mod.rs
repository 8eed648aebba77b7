// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the TOML-backed raw model and the validated model.
//! - `loader.rs`: reading a config file through the [`FileSystem`](crate::fs::FileSystem) seam.
//! - `validate.rs`: raw → validated, rejecting broken repositories one by one.
//! - `duration.rs`: the `"250ms"` / `"3s"` / `"1m"` duration syntax.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_and_validate_with, load_from_path, parse_config};
pub use model::{
    Config, EngineConfig, GlobalSettings, RawConfigFile, RejectedRepository, RepositoryConfig,
};
pub use validate::{validate_config, validate_repository};
