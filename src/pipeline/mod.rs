// src/pipeline/mod.rs

//! The action pipeline: status → message → stage → commit → push.
//!
//! This is the only component with on-disk side effects. It is synchronous
//! and runs on the blocking pool; callers must hold the repository's
//! execution lock for the whole call.

pub mod summary;
pub mod template;

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::types::RepoId;
use crate::vcs::{CommitId, Engine, EngineError};

pub use summary::change_summary;
pub use template::{render, TemplateContext};

pub const DEFAULT_COMMIT_TEMPLATE: &str =
    "savepoint: {{save_count}} save(s) at {{timestamp}}\n\n{{change_summary}}";

/// Everything the pipeline needs for one run, snapshotted by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub repo_id: RepoId,
    pub save_count: u32,
    pub changed_paths: Vec<PathBuf>,
    pub commit_template: String,
    pub auto_push: bool,
    pub remote: String,
    /// Branch pinned in config, if any.
    pub branch: Option<String>,
    /// Branch observed by the last successful action.
    pub known_branch: Option<String>,
    /// A previous push failed; retry it even if there is nothing to commit.
    pub push_pending: bool,
}

/// Bounded exponential backoff for pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Pushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Status, stage or commit failed; nothing was committed.
    Engine,
    /// Commit landed but the push did not.
    Push,
    /// Merge conflicts or an unexpected branch.
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    /// The commit step succeeded (or there was nothing to commit).
    pub success: bool,
    pub commit_id: Option<CommitId>,
    pub pushed: bool,
    /// The tree was already clean; nothing was committed.
    pub skipped: bool,
    pub branch: Option<String>,
    pub error: Option<ActionFailure>,
}

impl ActionResult {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            commit_id: None,
            pushed: false,
            skipped: false,
            branch: None,
            error: Some(ActionFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Committed but the push failed.
    pub fn is_partial(&self) -> bool {
        self.success && self.failure_kind() == Some(FailureKind::Push)
    }
}

fn engine_failure(err: EngineError) -> ActionResult {
    let kind = if err.is_conflict() {
        FailureKind::Conflict
    } else {
        FailureKind::Engine
    };
    ActionResult::failed(kind, err.to_string())
}

/// Run one pipeline against `engine`. Never panics on engine errors; every
/// failure is reported through the returned [`ActionResult`].
pub fn run_pipeline(
    engine: &dyn Engine,
    request: &ActionRequest,
    retry: &RetryPolicy,
    on_stage: &(dyn Fn(PipelineStage) + Send + Sync),
) -> ActionResult {
    let repo = &request.repo_id;

    let status = match engine.status() {
        Ok(status) => status,
        Err(err) => return engine_failure(err),
    };

    if !status.conflicted.is_empty() {
        return ActionResult::failed(
            FailureKind::Conflict,
            format!("merge conflicts detected in {} path(s)", status.conflicted.len()),
        );
    }

    if let Some(expected) = request.branch.as_ref().or(request.known_branch.as_ref()) {
        if status.branch.as_ref() != Some(expected) {
            let current = status.branch.as_deref().unwrap_or("(detached HEAD)");
            return ActionResult::failed(
                FailureKind::Conflict,
                format!("branch changed from '{expected}' to '{current}'"),
            );
        }
    }

    let push_branch = request.branch.clone().or_else(|| status.branch.clone());

    if status.changes.is_empty() {
        info!(repo = %repo, "working tree clean; nothing to commit");
        let mut result = ActionResult {
            success: true,
            commit_id: None,
            pushed: false,
            skipped: true,
            branch: status.branch.clone(),
            error: None,
        };
        if request.auto_push && request.push_pending {
            apply_push(engine, request, push_branch.as_deref(), retry, on_stage, &mut result);
        }
        return result;
    }

    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let summary = change_summary(&status.changes);
    let message = render(
        &request.commit_template,
        &TemplateContext {
            timestamp: &timestamp,
            repo_id: repo.as_str(),
            save_count: request.save_count,
            change_count: status.changes.len(),
            change_summary: &summary,
        },
    );

    if let Err(err) = engine.stage_all() {
        return engine_failure(err);
    }

    let commit_id = match engine.commit(&message) {
        Ok(id) => id,
        Err(err) => return engine_failure(err),
    };
    info!(repo = %repo, commit = %commit_id.short(), files = status.changes.len(), "committed");

    let mut result = ActionResult {
        success: true,
        commit_id: Some(commit_id),
        pushed: false,
        skipped: false,
        branch: status.branch.clone(),
        error: None,
    };

    if request.auto_push {
        apply_push(engine, request, push_branch.as_deref(), retry, on_stage, &mut result);
    }

    result
}

fn apply_push(
    engine: &dyn Engine,
    request: &ActionRequest,
    branch: Option<&str>,
    retry: &RetryPolicy,
    on_stage: &(dyn Fn(PipelineStage) + Send + Sync),
    result: &mut ActionResult,
) {
    let Some(branch) = branch else {
        result.error = Some(ActionFailure {
            kind: FailureKind::Push,
            message: "no branch to push (detached HEAD)".to_string(),
        });
        return;
    };

    on_stage(PipelineStage::Pushing);
    match push_with_retry(engine, &request.remote, branch, retry) {
        Ok(()) => {
            info!(repo = %request.repo_id, remote = %request.remote, branch, "pushed");
            result.pushed = true;
        }
        Err(err) => {
            warn!(repo = %request.repo_id, error = %err, "push failed; commit kept locally");
            result.error = Some(ActionFailure {
                kind: FailureKind::Push,
                message: err.to_string(),
            });
        }
    }
}

/// Push, retrying transient failures with doubling backoff.
pub fn push_with_retry(
    engine: &dyn Engine,
    remote: &str,
    branch: &str,
    retry: &RetryPolicy,
) -> Result<(), EngineError> {
    let attempts = retry.attempts.max(1);
    let mut backoff = retry.initial_backoff;
    let mut attempt = 1;

    loop {
        match engine.push(remote, branch) {
            Ok(()) => return Ok(()),
            Err(err) if err.is_transient() && attempt < attempts => {
                debug!(attempt, ?backoff, error = %err, "push failed; retrying");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(retry.max_backoff);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
