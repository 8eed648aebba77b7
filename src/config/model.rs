// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::orchestrator::RepoPolicy;
use crate::pipeline::{RetryPolicy, DEFAULT_COMMIT_TEMPLATE};
use crate::rules::Rule;
use crate::types::{GroupingMode, RepoId};
use crate::vcs::EngineKind;
use crate::watch::grouping::DEFAULT_TEMP_PATTERNS;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [global]
/// grouping_mode = "smart"
///
/// [repositories.notes]
/// path = "~/notes"
/// rule = { type = "inactivity", period = "30s" }
///
/// [repositories.notes.engine]
/// type = "git"
/// auto_push = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub global: RawGlobalSection,

    /// Keys are the repository ids. Sections stay untyped here so a malformed
    /// one can be rejected on its own during validation.
    #[serde(default)]
    pub repositories: BTreeMap<String, toml::Value>,
}

/// `[global]` section. Durations are strings like `"250ms"` or `"3s"`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGlobalSection {
    #[serde(default)]
    pub grouping_mode: GroupingMode,

    #[serde(default = "default_buffer_window")]
    pub buffer_window: String,

    #[serde(default = "default_settle_delay")]
    pub settle_delay: String,

    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,

    /// Regexes matched against file names; replaces the built-in list.
    #[serde(default)]
    pub temp_patterns: Option<Vec<String>>,

    /// Globs (relative to each repository root) the watcher never reports.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    #[serde(default = "default_action_workers")]
    pub action_workers: usize,

    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: String,

    #[serde(default = "default_push_retries")]
    pub push_retries: u32,

    #[serde(default = "default_push_backoff")]
    pub push_backoff: String,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default)]
    pub bulk_change_threshold: usize,

    #[serde(default = "default_bulk_change_window")]
    pub bulk_change_window: String,
}

fn default_buffer_window() -> String {
    "100ms".to_string()
}

fn default_settle_delay() -> String {
    "20ms".to_string()
}

fn default_batch_threshold() -> usize {
    5
}

fn default_ignore() -> Vec<String> {
    vec![".git".to_string(), ".git/**".to_string()]
}

fn default_action_workers() -> usize {
    4
}

fn default_shutdown_grace() -> String {
    "10s".to_string()
}

fn default_push_retries() -> u32 {
    3
}

fn default_push_backoff() -> String {
    "500ms".to_string()
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_bulk_change_window() -> String {
    "5s".to_string()
}

impl Default for RawGlobalSection {
    fn default() -> Self {
        Self {
            grouping_mode: GroupingMode::default(),
            buffer_window: default_buffer_window(),
            settle_delay: default_settle_delay(),
            batch_threshold: default_batch_threshold(),
            temp_patterns: None,
            ignore: default_ignore(),
            action_workers: default_action_workers(),
            shutdown_grace: default_shutdown_grace(),
            push_retries: default_push_retries(),
            push_backoff: default_push_backoff(),
            max_consecutive_failures: default_max_consecutive_failures(),
            bulk_change_threshold: 0,
            bulk_change_window: default_bulk_change_window(),
        }
    }
}

/// `[repositories.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRepositoryConfig {
    pub path: PathBuf,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Single rule shorthand.
    #[serde(default)]
    pub rule: Option<RawRule>,

    /// Several rules; any of them triggering is enough.
    #[serde(default)]
    pub rules: Vec<RawRule>,

    #[serde(default)]
    pub engine: RawEngineConfig,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawRule {
    Inactivity { period: String },
    SaveCount { threshold: u32 },
    Manual,
}

/// `[repositories.<id>.engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEngineConfig {
    #[serde(rename = "type", default = "default_engine_type")]
    pub kind: String,

    #[serde(default)]
    pub auto_push: bool,

    #[serde(default = "default_remote")]
    pub remote: String,

    /// Pin the branch; defaults to whatever is checked out.
    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

fn default_engine_type() -> String {
    "git".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_commit_message() -> String {
    DEFAULT_COMMIT_TEMPLATE.to_string()
}

impl Default for RawEngineConfig {
    fn default() -> Self {
        Self {
            kind: default_engine_type(),
            auto_push: false,
            remote: default_remote(),
            branch: None,
            commit_message: default_commit_message(),
        }
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalSettings,
    /// Every repository that passed validation, enabled or not.
    pub repositories: Vec<RepositoryConfig>,
    /// Repositories excluded because their section was invalid.
    pub rejected: Vec<RejectedRepository>,
}

impl Config {
    pub fn enabled_repositories(&self) -> impl Iterator<Item = &RepositoryConfig> {
        self.repositories.iter().filter(|r| r.enabled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSettings {
    pub grouping_mode: GroupingMode,
    pub buffer_window: Duration,
    pub settle_delay: Duration,
    pub batch_threshold: usize,
    pub temp_patterns: Vec<String>,
    pub ignore: Vec<String>,
    pub action_workers: usize,
    pub shutdown_grace: Duration,
    pub retry: RetryPolicy,
    pub policy: RepoPolicy,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            grouping_mode: GroupingMode::default(),
            buffer_window: Duration::from_millis(100),
            settle_delay: Duration::from_millis(20),
            batch_threshold: default_batch_threshold(),
            temp_patterns: DEFAULT_TEMP_PATTERNS.iter().map(|p| p.to_string()).collect(),
            ignore: default_ignore(),
            action_workers: default_action_workers(),
            shutdown_grace: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            policy: RepoPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryConfig {
    pub id: RepoId,
    /// Canonical path of the working tree.
    pub path: PathBuf,
    pub enabled: bool,
    pub rules: Vec<Rule>,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub auto_push: bool,
    pub remote: String,
    pub branch: Option<String>,
    pub commit_message: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Git,
            auto_push: false,
            remote: default_remote(),
            branch: None,
            commit_message: default_commit_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRepository {
    pub id: RepoId,
    pub reason: String,
}
