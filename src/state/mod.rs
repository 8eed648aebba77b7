// src/state/mod.rs

//! Per-repository runtime state and the shared snapshot store.

pub mod snapshot;
pub mod store;

use std::collections::BTreeSet;
use std::path::PathBuf;

use tokio::time::Instant;

use crate::rules::{ArmedTimer, RuleInputs};
use crate::types::RepoStatus;
use crate::vcs::CommitId;

pub use snapshot::RepoSnapshot;
pub use store::{Notification, StateStore};

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOrigin {
    /// A rule decided; when deferred, the rules are re-evaluated later.
    Rules,
    /// An explicit `trigger_now`; runs unconditionally.
    Manual,
}

/// What the in-flight action was dispatched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub save_count: u32,
    pub origin: TriggerOrigin,
    /// Paths recorded after dispatch; these stay pending on success.
    pub touched_since: BTreeSet<PathBuf>,
}

/// Mutable state owned by exactly one repository runtime.
#[derive(Debug, Clone)]
pub struct RepoRuntimeState {
    pub status: RepoStatus,
    pub last_change_at: Option<Instant>,
    pub pending_save_count: u32,
    pub pending_paths: BTreeSet<PathBuf>,
    pub last_commit_id: Option<CommitId>,
    pub last_error: Option<String>,
    pub timer: Option<ArmedTimer>,
    /// Reason for FROZEN / PAUSED / a latched ERROR.
    pub status_reason: Option<String>,
    pub consecutive_failures: u32,
    /// ERROR that only `resume` clears.
    pub halted: bool,
    pub push_pending: bool,
    pub known_branch: Option<String>,
    pub in_flight: Option<InFlight>,
    /// A trigger that arrived while an action was in flight.
    pub deferred: Option<TriggerOrigin>,
}

impl Default for RepoRuntimeState {
    fn default() -> Self {
        Self {
            status: RepoStatus::Idle,
            last_change_at: None,
            pending_save_count: 0,
            pending_paths: BTreeSet::new(),
            last_commit_id: None,
            last_error: None,
            timer: None,
            status_reason: None,
            consecutive_failures: 0,
            halted: false,
            push_pending: false,
            known_branch: None,
            in_flight: None,
            deferred: None,
        }
    }
}

impl RepoRuntimeState {
    pub fn rule_inputs(&self) -> RuleInputs<'_> {
        RuleInputs {
            pending_save_count: self.pending_save_count,
            last_change_at: self.last_change_at,
            armed_timer: self.timer.as_ref(),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_save_count > 0
    }

    /// Status to settle in once nothing is running.
    pub fn resting_status(&self) -> RepoStatus {
        if self.has_pending() {
            RepoStatus::Active
        } else {
            RepoStatus::Idle
        }
    }
}
