// crates/test-utils/src/builders.rs

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

use savepoint::config::{EngineConfig, RepositoryConfig};
use savepoint::rules::Rule;
use savepoint::types::{ChangeEvent, ChangeGroup, ChangeKind, OperationKind, RepoId};

/// Builder for `RepositoryConfig` to simplify test setup.
pub struct RepositoryConfigBuilder {
    config: RepositoryConfig,
}

impl RepositoryConfigBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            config: RepositoryConfig {
                id: RepoId::new(id),
                path: PathBuf::from(format!("/nonexistent/savepoint-tests/{id}")),
                enabled: true,
                rules: vec![],
                engine: EngineConfig::default(),
            },
        }
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.path = path.as_ref().to_path_buf();
        self
    }

    pub fn inactivity(mut self, period: Duration) -> Self {
        self.config.rules.push(Rule::Inactivity { period });
        self
    }

    pub fn save_count(mut self, threshold: u32) -> Self {
        self.config.rules.push(Rule::SaveCount { threshold });
        self
    }

    pub fn manual(mut self) -> Self {
        self.config.rules.push(Rule::Manual);
        self
    }

    pub fn auto_push(mut self, remote: &str) -> Self {
        self.config.engine.auto_push = true;
        self.config.engine.remote = remote.to_string();
        self
    }

    pub fn branch(mut self, branch: &str) -> Self {
        self.config.engine.branch = Some(branch.to_string());
        self
    }

    pub fn commit_message(mut self, template: &str) -> Self {
        self.config.engine.commit_message = template.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.config.enabled = false;
        self
    }

    pub fn build(mut self) -> RepositoryConfig {
        if self.config.rules.is_empty() {
            self.config.rules.push(Rule::Manual);
        }
        self.config
    }
}

/// Raw event helpers.
pub fn created(seq: u64, path: &str, at: Instant) -> ChangeEvent {
    ChangeEvent::new(seq, path, ChangeKind::Created, at)
}

pub fn modified(seq: u64, path: &str, at: Instant) -> ChangeEvent {
    ChangeEvent::new(seq, path, ChangeKind::Modified, at)
}

pub fn deleted(seq: u64, path: &str, at: Instant) -> ChangeEvent {
    ChangeEvent::new(seq, path, ChangeKind::Deleted, at)
}

pub fn moved(seq: u64, from: &str, to: &str, at: Instant) -> ChangeEvent {
    ChangeEvent::new(
        seq,
        to,
        ChangeKind::Moved {
            from: PathBuf::from(from),
        },
        at,
    )
}

/// A one-file edit group, as the buffer would emit it.
pub fn edit_group(path: &str) -> ChangeGroup {
    ChangeGroup {
        paths: BTreeSet::from([PathBuf::from(path)]),
        related: BTreeSet::new(),
        operation: OperationKind::SimpleEdit,
        confidence: 1.0,
        event_count: 1,
        at: Instant::now(),
    }
}
