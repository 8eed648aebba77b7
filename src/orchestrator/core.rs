// src/orchestrator/core.rs

//! Pure per-repository state machine.
//!
//! [`RepoMachine`] consumes [`RepoEvent`]s and produces:
//! - an updated [`RepoRuntimeState`]
//! - a list of [`RepoCommand`]s describing what the IO shell should do next
//!
//! It owns no channels or tasks and performs no IO, so every transition can
//! be tested by calling [`RepoMachine::step`] with an explicit `now`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::RepositoryConfig;
use crate::pipeline::ActionRequest;
use crate::rules::{evaluate_all, ArmedTimer, Rule, Stimulus, TriggerDecision};
use crate::state::{InFlight, Notification, RepoRuntimeState, RepoSnapshot, TriggerOrigin};
use crate::types::{RepoId, RepoStatus, TimerToken};

use super::guard::BulkChangeGuard;
use super::transitions;
use super::{RepoCommand, RepoEvent, RepoPolicy};

/// Static, per-repository behaviour derived from config.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoSettings {
    pub rules: Vec<Rule>,
    pub commit_template: String,
    pub auto_push: bool,
    pub remote: String,
    pub branch: Option<String>,
    pub max_consecutive_failures: u32,
    pub bulk_change_threshold: usize,
    pub bulk_change_window: Duration,
}

impl RepoSettings {
    pub fn new(repo: &RepositoryConfig, policy: &RepoPolicy) -> Self {
        Self {
            rules: repo.rules.clone(),
            commit_template: repo.engine.commit_message.clone(),
            auto_push: repo.engine.auto_push,
            remote: repo.engine.remote.clone(),
            branch: repo.engine.branch.clone(),
            max_consecutive_failures: policy.max_consecutive_failures,
            bulk_change_threshold: policy.bulk_change_threshold,
            bulk_change_window: policy.bulk_change_window,
        }
    }
}

/// Result of a single [`RepoMachine::step`].
#[derive(Debug, Default)]
pub struct RepoStep {
    pub commands: Vec<RepoCommand>,
    pub keep_running: bool,
}

#[derive(Debug)]
pub struct RepoMachine {
    pub(super) id: RepoId,
    pub(super) settings: RepoSettings,
    pub(super) state: RepoRuntimeState,
    pub(super) guard: BulkChangeGuard,
    pub(super) next_token: u64,
    pub(super) shutting_down: bool,
}

impl RepoMachine {
    pub fn new(id: RepoId, settings: RepoSettings) -> Self {
        let guard = BulkChangeGuard::new(settings.bulk_change_threshold, settings.bulk_change_window);
        Self {
            id,
            settings,
            state: RepoRuntimeState::default(),
            guard,
            next_token: 0,
            shutting_down: false,
        }
    }

    pub fn id(&self) -> &RepoId {
        &self.id
    }

    pub fn settings(&self) -> &RepoSettings {
        &self.settings
    }

    pub fn state(&self) -> &RepoRuntimeState {
        &self.state
    }

    pub fn snapshot(&self, now: Instant) -> RepoSnapshot {
        RepoSnapshot::capture(&self.id, &self.state, now)
    }

    /// Handle one event and return the commands for the IO shell. The last
    /// command is always a snapshot refresh for the state store.
    pub fn step(&mut self, event: RepoEvent, now: Instant) -> RepoStep {
        let mut out = Vec::new();
        let keep_running = match event {
            RepoEvent::Changes(group) => {
                transitions::on_changes(self, group, now, &mut out);
                true
            }
            RepoEvent::TimerFired { token } => {
                transitions::on_timer(self, token, now, &mut out);
                true
            }
            RepoEvent::ActionProgress(stage) => {
                transitions::on_progress(self, stage, now, &mut out);
                true
            }
            RepoEvent::ActionCompleted(result) => {
                transitions::on_action_completed(self, result, now, &mut out);
                !self.shutting_down
            }
            RepoEvent::LockBusy => {
                transitions::on_lock_busy(self, now, &mut out);
                true
            }
            RepoEvent::LockReleased => {
                transitions::run_deferred(self, now, &mut out);
                true
            }
            RepoEvent::TriggerNow => {
                transitions::on_trigger_now(self, now, &mut out);
                true
            }
            RepoEvent::Pause { reason } => {
                let reason = reason.unwrap_or_else(|| "paused by request".to_string());
                self.pause(reason, now, &mut out);
                true
            }
            RepoEvent::Resume => {
                transitions::on_resume(self, now, &mut out);
                true
            }
            RepoEvent::Freeze { reason } => {
                transitions::on_freeze(self, reason, now, &mut out);
                true
            }
            RepoEvent::Shutdown => transitions::on_shutdown(self, &mut out),
        };

        out.push(RepoCommand::Publish(Notification::Updated {
            snapshot: self.snapshot(now),
        }));
        RepoStep {
            commands: out,
            keep_running,
        }
    }

    pub(super) fn set_status(&mut self, new: RepoStatus, now: Instant, out: &mut Vec<RepoCommand>) {
        let old = self.state.status;
        if old == new {
            return;
        }
        self.state.status = new;
        debug!(repo = %self.id, %old, %new, "status transition");
        out.push(RepoCommand::Publish(Notification::StateChanged {
            repo_id: self.id.clone(),
            old,
            new,
            snapshot: self.snapshot(now),
        }));
    }

    pub(super) fn arm_timer(&mut self, deadline: Instant, out: &mut Vec<RepoCommand>) {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.state.timer = Some(ArmedTimer { token, deadline });
        out.push(RepoCommand::ArmTimer { token, deadline });
    }

    pub(super) fn cancel_timer(&mut self, out: &mut Vec<RepoCommand>) {
        if self.state.timer.take().is_some() {
            out.push(RepoCommand::CancelTimer);
        }
    }

    /// Trigger-eligible: not paused, frozen or latched in ERROR.
    pub(super) fn can_trigger(&self) -> bool {
        !self.state.status.suppresses_triggers() && !self.state.halted && !self.shutting_down
    }

    pub(super) fn evaluate(&self, stimulus: Stimulus, now: Instant) -> TriggerDecision {
        evaluate_all(&self.settings.rules, &self.state.rule_inputs(), stimulus, now)
    }

    pub(super) fn apply_decision(&mut self, decision: TriggerDecision, now: Instant, out: &mut Vec<RepoCommand>) {
        match decision {
            TriggerDecision::NoAction => {}
            TriggerDecision::Reschedule(deadline) => self.arm_timer(deadline, out),
            TriggerDecision::Trigger => self.try_trigger(TriggerOrigin::Rules, now, out),
        }
    }

    pub(super) fn try_trigger(&mut self, origin: TriggerOrigin, now: Instant, out: &mut Vec<RepoCommand>) {
        if !self.can_trigger() {
            debug!(repo = %self.id, status = %self.state.status, "trigger suppressed");
            return;
        }
        if self.state.in_flight.is_some() {
            // Manual wins over a rule-based deferral.
            self.state.deferred = match (self.state.deferred, origin) {
                (Some(TriggerOrigin::Manual), _) | (_, TriggerOrigin::Manual) => Some(TriggerOrigin::Manual),
                _ => Some(TriggerOrigin::Rules),
            };
            debug!(repo = %self.id, ?origin, "action in flight; trigger deferred");
            return;
        }
        if origin == TriggerOrigin::Rules && !self.state.has_pending() && !self.state.push_pending {
            return;
        }
        self.dispatch(origin, now, out);
    }

    fn dispatch(&mut self, origin: TriggerOrigin, now: Instant, out: &mut Vec<RepoCommand>) {
        self.cancel_timer(out);
        self.state.deferred = None;
        self.state.in_flight = Some(InFlight {
            save_count: self.state.pending_save_count,
            origin,
            touched_since: Default::default(),
        });
        let request = self.build_request();
        self.set_status(RepoStatus::Committing, now, out);
        out.push(RepoCommand::RunAction(request));
    }

    fn build_request(&self) -> ActionRequest {
        ActionRequest {
            repo_id: self.id.clone(),
            save_count: self.state.pending_save_count,
            changed_paths: self.state.pending_paths.iter().cloned().collect(),
            commit_template: self.settings.commit_template.clone(),
            auto_push: self.settings.auto_push,
            remote: self.settings.remote.clone(),
            branch: self.settings.branch.clone(),
            known_branch: self.state.known_branch.clone(),
            push_pending: self.state.push_pending,
        }
    }

    pub(super) fn pause(&mut self, reason: String, now: Instant, out: &mut Vec<RepoCommand>) {
        if self.state.status == RepoStatus::Paused {
            return;
        }
        self.cancel_timer(out);
        self.state.deferred = None;
        self.state.status_reason = Some(reason);
        self.set_status(RepoStatus::Paused, now, out);
    }
}
