// src/types.rs

//! Shared domain types used across the buffer, orchestrator and observers.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Identifier of a configured repository (the `<id>` in `[repositories.<id>]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What happened to a path, as reported by the change source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// The event path is the destination; `from` is where it came from.
    Moved { from: PathBuf },
}

/// A single raw filesystem change, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub at: Instant,
    /// Strictly increasing per change source.
    pub seq: u64,
}

impl ChangeEvent {
    pub fn new(seq: u64, path: impl Into<PathBuf>, kind: ChangeKind, at: Instant) -> Self {
        Self {
            path: path.into(),
            kind,
            at,
            seq,
        }
    }

    /// Every path this event touches (both ends for a move).
    pub fn touched_paths(&self) -> impl Iterator<Item = &Path> {
        let from = match &self.kind {
            ChangeKind::Moved { from } => Some(from.as_path()),
            _ => None,
        };
        std::iter::once(self.path.as_path()).chain(from)
    }
}

/// Classification of a [`ChangeGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SimpleEdit,
    AtomicRewrite,
    Batch,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::SimpleEdit => "simple_edit",
            OperationKind::AtomicRewrite => "atomic_rewrite",
            OperationKind::Batch => "batch",
            OperationKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One logical "save" produced by the event buffer.
///
/// `paths` are the files the user meant to change; `related` are paths that
/// were absorbed into the group (temp files, move sources).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeGroup {
    pub paths: BTreeSet<PathBuf>,
    pub related: BTreeSet<PathBuf>,
    pub operation: OperationKind,
    pub confidence: f32,
    pub event_count: usize,
    #[serde(skip)]
    pub at: Instant,
}

impl ChangeGroup {
    /// Union of primary and related paths.
    pub fn all_paths(&self) -> BTreeSet<PathBuf> {
        self.paths.union(&self.related).cloned().collect()
    }
}

/// How the event buffer groups raw events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Every event becomes its own group immediately.
    Off,
    /// Debounce per path and pair moves with their delete/create halves.
    Simple,
    /// `Simple` plus atomic-rewrite and batch detection.
    #[default]
    Smart,
}

/// Lifecycle status of a repository runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepoStatus {
    Idle,
    Active,
    Committing,
    Pushing,
    Frozen,
    Paused,
    Error,
}

impl RepoStatus {
    pub fn is_action_in_progress(self) -> bool {
        matches!(self, RepoStatus::Committing | RepoStatus::Pushing)
    }

    /// FROZEN and PAUSED keep pending state but never trigger automatically.
    pub fn suppresses_triggers(self) -> bool {
        matches!(self, RepoStatus::Frozen | RepoStatus::Paused)
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepoStatus::Idle => "IDLE",
            RepoStatus::Active => "ACTIVE",
            RepoStatus::Committing => "COMMITTING",
            RepoStatus::Pushing => "PUSHING",
            RepoStatus::Frozen => "FROZEN",
            RepoStatus::Paused => "PAUSED",
            RepoStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Monotonic token identifying one armed timer of one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerToken(pub u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
