// src/orchestrator/transitions.rs

//! Event handlers for [`RepoMachine`]. Each handler mutates the machine and
//! appends the commands the IO shell should run.

use std::path::PathBuf;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::duration::format_duration;
use crate::pipeline::{ActionResult, FailureKind, PipelineStage};
use crate::rules::{Stimulus, TriggerDecision};
use crate::state::{Notification, TriggerOrigin};
use crate::types::{ChangeGroup, RepoStatus, TimerToken};

use super::core::RepoMachine;
use super::RepoCommand;

pub(super) fn on_changes(m: &mut RepoMachine, group: ChangeGroup, now: Instant, out: &mut Vec<RepoCommand>) {
    if m.shutting_down {
        debug!(repo = %m.id, "shutting down; change ignored");
        return;
    }

    let paths: Vec<PathBuf> = group.paths.iter().cloned().collect();
    let state = &mut m.state;
    state.pending_save_count = state.pending_save_count.saturating_add(1);
    state.pending_paths.extend(paths.iter().cloned());
    if let Some(in_flight) = state.in_flight.as_mut() {
        in_flight.touched_since.extend(paths.iter().cloned());
    }
    state.last_change_at = Some(now);

    out.push(RepoCommand::Publish(Notification::Changes {
        repo_id: m.id.clone(),
        group,
    }));

    if let Some(count) = m.guard.record(&paths, now) {
        if !m.state.status.suppresses_triggers() {
            let reason = format!(
                "bulk change: {count} files changed within {}",
                format_duration(m.guard.window())
            );
            warn!(repo = %m.id, count, "bulk change detected; pausing");
            m.pause(reason, now, out);
        }
        return;
    }

    if !m.can_trigger() {
        debug!(repo = %m.id, status = %m.state.status, "change recorded; triggers suppressed");
        return;
    }

    if matches!(m.state.status, RepoStatus::Idle | RepoStatus::Error) {
        m.state.status_reason = None;
        m.set_status(RepoStatus::Active, now, out);
    }

    let decision = m.evaluate(Stimulus::Changes, now);
    m.apply_decision(decision, now, out);
}

pub(super) fn on_timer(m: &mut RepoMachine, token: TimerToken, now: Instant, out: &mut Vec<RepoCommand>) {
    let current = m.state.timer.is_some_and(|t| t.token == token);
    if !current {
        debug!(repo = %m.id, %token, "stale timer ignored");
        return;
    }
    if !m.can_trigger() {
        return;
    }

    let decision = m.evaluate(Stimulus::TimerExpired { token }, now);
    if decision == TriggerDecision::Trigger {
        m.state.timer = None;
    }
    m.apply_decision(decision, now, out);
}

pub(super) fn on_progress(m: &mut RepoMachine, stage: PipelineStage, now: Instant, out: &mut Vec<RepoCommand>) {
    match stage {
        PipelineStage::Pushing if m.state.status == RepoStatus::Committing => {
            m.set_status(RepoStatus::Pushing, now, out);
        }
        PipelineStage::Pushing => {}
    }
}

pub(super) fn on_action_completed(
    m: &mut RepoMachine,
    result: ActionResult,
    now: Instant,
    out: &mut Vec<RepoCommand>,
) {
    let Some(in_flight) = m.state.in_flight.take() else {
        warn!(repo = %m.id, "completion without an action in flight; ignored");
        return;
    };
    let was_running = m.state.status.is_action_in_progress();

    out.push(RepoCommand::Publish(Notification::Action {
        repo_id: m.id.clone(),
        result: result.clone(),
    }));

    let failure_message = result.error.as_ref().map(|e| e.message.clone());

    if result.success {
        let state = &mut m.state;
        state.pending_save_count = state.pending_save_count.saturating_sub(in_flight.save_count);
        state.pending_paths = in_flight.touched_since;
        if let Some(commit) = &result.commit_id {
            state.last_commit_id = Some(commit.clone());
        }
        if result.branch.is_some() {
            state.known_branch = result.branch.clone();
        }
        if result.pushed {
            state.push_pending = false;
        } else if result.is_partial() {
            state.push_pending = true;
        }

        if result.is_partial() {
            state.consecutive_failures += 1;
            state.last_error = failure_message.clone();
            if state.consecutive_failures >= m.settings.max_consecutive_failures {
                let reason = format!(
                    "push failed {} times in a row: {}",
                    m.state.consecutive_failures,
                    failure_message.unwrap_or_default()
                );
                halt(m, reason, now, out);
                return;
            }
        } else {
            state.consecutive_failures = 0;
            state.last_error = None;
        }

        if was_running {
            let next = m.state.resting_status();
            m.set_status(next, now, out);
        }
        if m.shutting_down {
            return;
        }
        run_deferred(m, now, out);
        return;
    }

    let message = failure_message.unwrap_or_else(|| "action failed".to_string());
    m.state.last_error = Some(message.clone());
    m.state.deferred = None;

    match result.failure_kind() {
        Some(FailureKind::Conflict) => {
            warn!(repo = %m.id, %message, "conflict; freezing repository");
            m.cancel_timer(out);
            m.state.status_reason = Some(message);
            m.set_status(RepoStatus::Frozen, now, out);
        }
        _ => {
            m.state.consecutive_failures += 1;
            if m.state.consecutive_failures >= m.settings.max_consecutive_failures {
                let reason = format!(
                    "action failed {} times in a row: {message}",
                    m.state.consecutive_failures
                );
                halt(m, reason, now, out);
            } else if was_running {
                m.set_status(RepoStatus::Error, now, out);
            }
        }
    }
}

fn halt(m: &mut RepoMachine, reason: String, now: Instant, out: &mut Vec<RepoCommand>) {
    warn!(repo = %m.id, %reason, "too many failures; waiting for resume");
    m.cancel_timer(out);
    m.state.halted = true;
    m.state.deferred = None;
    m.state.status_reason = Some(reason.clone());
    out.push(RepoCommand::Publish(Notification::Error {
        repo_id: m.id.clone(),
        message: reason,
    }));
    // A pause outranks the latch; resume clears both.
    if m.state.status != RepoStatus::Paused {
        m.set_status(RepoStatus::Error, now, out);
    }
}

/// Run a trigger that was deferred while an action was in flight.
pub(super) fn run_deferred(m: &mut RepoMachine, now: Instant, out: &mut Vec<RepoCommand>) {
    if m.state.in_flight.is_some() {
        return;
    }
    match m.state.deferred.take() {
        Some(TriggerOrigin::Manual) => m.try_trigger(TriggerOrigin::Manual, now, out),
        Some(TriggerOrigin::Rules) => {
            let decision = m.evaluate(Stimulus::Recheck, now);
            m.apply_decision(decision, now, out);
        }
        None => {}
    }
}

pub(super) fn on_lock_busy(m: &mut RepoMachine, now: Instant, out: &mut Vec<RepoCommand>) {
    let Some(in_flight) = m.state.in_flight.take() else {
        return;
    };
    info!(repo = %m.id, "execution lock busy; trigger deferred until it is released");
    // Anything touched meanwhile is already pending.
    m.state.deferred = Some(in_flight.origin);
    if m.state.status.is_action_in_progress() {
        let next = m.state.resting_status();
        m.set_status(next, now, out);
    }
}

pub(super) fn on_trigger_now(m: &mut RepoMachine, now: Instant, out: &mut Vec<RepoCommand>) {
    if !m.can_trigger() {
        warn!(repo = %m.id, status = %m.state.status, "trigger_now ignored; resume the repository first");
        return;
    }
    m.try_trigger(TriggerOrigin::Manual, now, out);
}

pub(super) fn on_resume(m: &mut RepoMachine, now: Instant, out: &mut Vec<RepoCommand>) {
    let status = m.state.status;
    if !matches!(status, RepoStatus::Paused | RepoStatus::Frozen | RepoStatus::Error) && !m.state.halted {
        debug!(repo = %m.id, %status, "resume ignored; nothing to resume");
        return;
    }

    m.state.halted = false;
    m.state.consecutive_failures = 0;
    m.state.status_reason = None;
    m.guard.reset();

    if m.state.in_flight.is_some() {
        m.set_status(RepoStatus::Committing, now, out);
        return;
    }

    let next = m.state.resting_status();
    m.set_status(next, now, out);
    if m.state.has_pending() || m.state.push_pending {
        let decision = m.evaluate(Stimulus::Recheck, now);
        m.apply_decision(decision, now, out);
    }
}

pub(super) fn on_freeze(m: &mut RepoMachine, reason: String, now: Instant, out: &mut Vec<RepoCommand>) {
    m.cancel_timer(out);
    m.state.deferred = None;
    m.state.status_reason = Some(reason);
    m.set_status(RepoStatus::Frozen, now, out);
}

/// Returns whether the runtime must keep running to collect an in-flight result.
pub(super) fn on_shutdown(m: &mut RepoMachine, out: &mut Vec<RepoCommand>) -> bool {
    m.shutting_down = true;
    m.state.deferred = None;
    m.cancel_timer(out);
    m.state.in_flight.is_some()
}
