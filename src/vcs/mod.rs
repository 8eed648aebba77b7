// src/vcs/mod.rs

//! Version-control engines.
//!
//! The orchestrator never talks to a VCS directly; the action pipeline drives
//! an [`Engine`]. Engine calls are blocking and are run on the blocking pool.

pub mod git;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use git::GitCliEngine;

/// Identifier of a commit as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    /// First 8 characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed { from: PathBuf },
    TypeChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub status: FileStatus,
}

/// Working tree state as seen by the engine (after its ignore rules).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingTreeStatus {
    pub changes: Vec<FileChange>,
    pub conflicted: Vec<PathBuf>,
    /// `None` for a detached HEAD.
    pub branch: Option<String>,
}

impl WorkingTreeStatus {
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty() && self.conflicted.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{op} failed: {detail}")]
    Command { op: &'static str, detail: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("push to {remote} was rejected: {detail}")]
    PushRejected { remote: String, detail: String },

    #[error("push to {remote} failed: {detail}")]
    PushUnavailable { remote: String, detail: String },
}

impl EngineError {
    /// Worth retrying with backoff (network trouble rather than a refusal).
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::PushUnavailable { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }
}

/// Operations the action pipeline needs from a version-control system.
pub trait Engine: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn status(&self) -> Result<WorkingTreeStatus, EngineError>;

    /// Stage every change the engine considers part of the working tree.
    fn stage_all(&self) -> Result<(), EngineError>;

    fn commit(&self, message: &str) -> Result<CommitId, EngineError>;

    fn push(&self, remote: &str, branch: &str) -> Result<(), EngineError>;
}

/// Supported engine types (`[repositories.<id>.engine] type = "..."`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Git,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Git => f.write_str("git"),
        }
    }
}

pub fn build_engine(kind: EngineKind, root: PathBuf) -> Arc<dyn Engine> {
    match kind {
        EngineKind::Git => Arc::new(GitCliEngine::new(root)),
    }
}
