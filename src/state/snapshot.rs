// src/state/snapshot.rs

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::types::{RepoId, RepoStatus};

use super::RepoRuntimeState;

/// Read-only, serialisable view of one repository for observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoSnapshot {
    pub repo_id: RepoId,
    pub status: RepoStatus,
    pub pending_save_count: u32,
    pub pending_paths: Vec<String>,
    pub last_change: Option<DateTime<Utc>>,
    pub last_commit_id: Option<String>,
    pub last_error: Option<String>,
    pub status_reason: Option<String>,
    pub consecutive_failures: u32,
    pub push_pending: bool,
    pub action_in_flight: bool,
    pub timer_deadline: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RepoSnapshot {
    pub fn capture(repo_id: &RepoId, state: &RepoRuntimeState, now: Instant) -> Self {
        let wall_now = Utc::now();
        Self {
            repo_id: repo_id.clone(),
            status: state.status,
            pending_save_count: state.pending_save_count,
            pending_paths: state
                .pending_paths
                .iter()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect(),
            last_change: state.last_change_at.and_then(|at| wall_clock(at, now, wall_now)),
            last_commit_id: state.last_commit_id.as_ref().map(|c| c.0.clone()),
            last_error: state.last_error.clone(),
            status_reason: state.status_reason.clone(),
            consecutive_failures: state.consecutive_failures,
            push_pending: state.push_pending,
            action_in_flight: state.in_flight.is_some(),
            timer_deadline: state.timer.and_then(|t| wall_clock(t.deadline, now, wall_now)),
            updated_at: wall_now,
        }
    }
}

/// Map a monotonic instant onto wall-clock time relative to `now`.
fn wall_clock(at: Instant, now: Instant, wall_now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if at <= now {
        let delta = TimeDelta::from_std(now.duration_since(at)).ok()?;
        wall_now.checked_sub_signed(delta)
    } else {
        let delta = TimeDelta::from_std(at.duration_since(now)).ok()?;
        wall_now.checked_add_signed(delta)
    }
}
