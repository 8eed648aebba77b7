// src/logging.rs

//! `tracing` subscriber setup.
//!
//! The `--log-level` flag wins. Without it, `SAVEPOINT_LOG` is read as a
//! full filter (`"info,savepoint::watch=trace"`), falling back to `info`.
//! Logs go to stderr so `--dry-run` output on stdout stays clean.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "SAVEPOINT_LOG";

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_env_filter(filter_for(cli_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialise logging")
}

fn filter_for(cli_level: Option<LogLevel>) -> EnvFilter {
    match cli_level {
        Some(level) => EnvFilter::new(level.directive()),
        None => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_environment() {
        assert_eq!(filter_for(Some(LogLevel::Trace)).to_string(), "trace");
        assert_eq!(filter_for(Some(LogLevel::Warn)).to_string(), "warn");
    }
}
