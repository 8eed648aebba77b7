// src/config/validate.rs

use std::path::{Path, PathBuf};

use globset::Glob;
use serde::Deserialize;
use tracing::warn;

use crate::config::duration::parse_duration;
use crate::config::model::{
    Config, EngineConfig, GlobalSettings, RawConfigFile, RawEngineConfig, RawGlobalSection,
    RawRepositoryConfig, RawRule, RejectedRepository, RepositoryConfig,
};
use crate::errors::{Result, SavepointError};
use crate::fs::FileSystem;
use crate::orchestrator::RepoPolicy;
use crate::pipeline::RetryPolicy;
use crate::rules::Rule;
use crate::types::RepoId;
use crate::vcs::EngineKind;
use crate::watch::grouping::{TempFilePatterns, DEFAULT_TEMP_PATTERNS};

const MAX_PUSH_BACKOFF: std::time::Duration = std::time::Duration::from_secs(8);

impl TryFrom<RawGlobalSection> for GlobalSettings {
    type Error = SavepointError;

    fn try_from(raw: RawGlobalSection) -> std::result::Result<Self, Self::Error> {
        let temp_patterns = raw
            .temp_patterns
            .unwrap_or_else(|| DEFAULT_TEMP_PATTERNS.iter().map(|p| p.to_string()).collect());
        TempFilePatterns::new(&temp_patterns)
            .map_err(|e| config_error(format!("[global].temp_patterns: {e}")))?;

        for pattern in &raw.ignore {
            Glob::new(pattern)
                .map_err(|e| config_error(format!("[global].ignore pattern '{pattern}': {e}")))?;
        }

        if raw.action_workers == 0 {
            return Err(config_error("[global].action_workers must be >= 1 (got 0)"));
        }
        if raw.push_retries == 0 {
            return Err(config_error("[global].push_retries must be >= 1 (got 0)"));
        }
        if raw.max_consecutive_failures == 0 {
            return Err(config_error("[global].max_consecutive_failures must be >= 1 (got 0)"));
        }

        let push_backoff = global_duration("push_backoff", &raw.push_backoff)?;

        Ok(GlobalSettings {
            grouping_mode: raw.grouping_mode,
            buffer_window: global_duration("buffer_window", &raw.buffer_window)?,
            settle_delay: global_duration("settle_delay", &raw.settle_delay)?,
            batch_threshold: raw.batch_threshold,
            temp_patterns,
            ignore: raw.ignore,
            action_workers: raw.action_workers,
            shutdown_grace: global_duration("shutdown_grace", &raw.shutdown_grace)?,
            retry: RetryPolicy {
                attempts: raw.push_retries,
                initial_backoff: push_backoff,
                max_backoff: MAX_PUSH_BACKOFF.max(push_backoff),
            },
            policy: RepoPolicy {
                max_consecutive_failures: raw.max_consecutive_failures,
                bulk_change_threshold: raw.bulk_change_threshold,
                bulk_change_window: global_duration("bulk_change_window", &raw.bulk_change_window)?,
            },
        })
    }
}

/// Validate a whole file. Problems in `[global]` are fatal; a broken
/// `[repositories.<id>]` section only excludes that repository.
pub fn validate_config(raw: RawConfigFile, base_dir: &Path, fs: &dyn FileSystem) -> Result<Config> {
    if raw.repositories.is_empty() {
        return Err(config_error(
            "config must contain at least one [repositories.<id>] section",
        ));
    }

    let global = GlobalSettings::try_from(raw.global)?;

    let mut repositories = Vec::new();
    let mut rejected = Vec::new();
    for (id, section) in raw.repositories {
        let validated = RawRepositoryConfig::deserialize(section)
            .map_err(|e| format!("invalid section: {}", e.to_string().trim_end()))
            .and_then(|repo| validate_repository(&id, repo, base_dir, fs));
        match validated {
            Ok(repo) => repositories.push(repo),
            Err(reason) => {
                warn!(repo = %id, %reason, "repository rejected");
                rejected.push(RejectedRepository {
                    id: RepoId::new(id),
                    reason,
                });
            }
        }
    }

    Ok(Config {
        global,
        repositories,
        rejected,
    })
}

/// Validate one repository section. Relative paths resolve against `base_dir`.
pub fn validate_repository(
    id: &str,
    raw: RawRepositoryConfig,
    base_dir: &Path,
    fs: &dyn FileSystem,
) -> std::result::Result<RepositoryConfig, String> {
    if id.trim().is_empty() {
        return Err("repository id must not be empty".to_string());
    }

    let path = resolve_path(&raw.path, base_dir);
    if !fs.is_dir(&path) {
        return Err(format!("path {:?} does not exist or is not a directory", path));
    }
    let path = fs
        .canonicalize(&path)
        .map_err(|e| format!("cannot resolve path {:?}: {e}", path))?;

    let raw_rules: Vec<RawRule> = raw.rule.into_iter().chain(raw.rules).collect();
    if raw_rules.is_empty() {
        return Err("no rule configured (set `rule = { type = ... }`)".to_string());
    }
    let rules = raw_rules
        .into_iter()
        .map(validate_rule)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let engine = validate_engine(raw.engine)?;

    Ok(RepositoryConfig {
        id: RepoId::new(id),
        path,
        enabled: raw.enabled,
        rules,
        engine,
    })
}

fn validate_rule(raw: RawRule) -> std::result::Result<Rule, String> {
    match raw {
        RawRule::Inactivity { period } => {
            let period = parse_duration(&period).map_err(|e| format!("inactivity period: {e}"))?;
            if period.is_zero() {
                return Err("inactivity period must be greater than zero".to_string());
            }
            Ok(Rule::Inactivity { period })
        }
        RawRule::SaveCount { threshold } => {
            if threshold == 0 {
                return Err("save_count threshold must be >= 1 (got 0)".to_string());
            }
            Ok(Rule::SaveCount { threshold })
        }
        RawRule::Manual => Ok(Rule::Manual),
    }
}

fn validate_engine(raw: RawEngineConfig) -> std::result::Result<EngineConfig, String> {
    let kind = match raw.kind.trim().to_lowercase().as_str() {
        "git" => EngineKind::Git,
        other => return Err(format!("unknown engine type '{other}'")),
    };
    if raw.commit_message.trim().is_empty() {
        return Err("engine.commit_message must not be empty".to_string());
    }
    if raw.auto_push && raw.remote.trim().is_empty() {
        return Err("engine.remote must be set when auto_push = true".to_string());
    }
    if let Some(branch) = &raw.branch {
        if branch.trim().is_empty() {
            return Err("engine.branch must not be empty when set".to_string());
        }
    }

    Ok(EngineConfig {
        kind,
        auto_push: raw.auto_push,
        remote: raw.remote,
        branch: raw.branch,
        commit_message: raw.commit_message,
    })
}

fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn global_duration(field: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value).map_err(|e| config_error(format!("[global].{field}: {e}")))
}

fn config_error(msg: impl Into<String>) -> SavepointError {
    SavepointError::ConfigError(msg.into())
}
