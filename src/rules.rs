// src/rules.rs

//! Trigger rules.
//!
//! Rules are pure: they look at a read-only view of the repository state and
//! a stimulus and return a [`TriggerDecision`]. All bookkeeping (counting
//! saves, arming timers) is done by the orchestrator.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::duration::format_duration;
use crate::types::TimerToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Trigger once no change has been seen for `period`.
    Inactivity { period: Duration },
    /// Trigger once `threshold` saves have accumulated.
    SaveCount { threshold: u32 },
    /// Only explicit `trigger_now` requests run the pipeline.
    Manual,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Inactivity { period } => write!(f, "inactivity({})", format_duration(*period)),
            Rule::SaveCount { threshold } => write!(f, "save_count({threshold})"),
            Rule::Manual => f.write_str("manual"),
        }
    }
}

/// A timer the orchestrator has armed and not yet consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub token: TimerToken,
    pub deadline: Instant,
}

/// What prompted an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stimulus {
    /// A change group was just recorded.
    Changes,
    /// A timer fired.
    TimerExpired { token: TimerToken },
    /// Re-evaluate current state, e.g. after an action completed.
    Recheck,
}

/// The slice of repository state rules are allowed to see.
#[derive(Debug, Clone, Copy)]
pub struct RuleInputs<'a> {
    pub pending_save_count: u32,
    pub last_change_at: Option<Instant>,
    pub armed_timer: Option<&'a ArmedTimer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    NoAction,
    Trigger,
    Reschedule(Instant),
}

pub fn evaluate(rule: &Rule, inputs: &RuleInputs<'_>, stimulus: Stimulus, now: Instant) -> TriggerDecision {
    match rule {
        Rule::Inactivity { period } => evaluate_inactivity(*period, inputs, stimulus, now),
        Rule::SaveCount { threshold } => match stimulus {
            Stimulus::Changes | Stimulus::Recheck if inputs.pending_save_count >= *threshold => {
                TriggerDecision::Trigger
            }
            _ => TriggerDecision::NoAction,
        },
        Rule::Manual => TriggerDecision::NoAction,
    }
}

fn evaluate_inactivity(
    period: Duration,
    inputs: &RuleInputs<'_>,
    stimulus: Stimulus,
    now: Instant,
) -> TriggerDecision {
    match stimulus {
        Stimulus::Changes => {
            let base = inputs.last_change_at.unwrap_or(now);
            TriggerDecision::Reschedule(base + period)
        }
        Stimulus::TimerExpired { token } => match inputs.armed_timer {
            Some(armed) if armed.token == token && now >= armed.deadline => TriggerDecision::Trigger,
            _ => TriggerDecision::NoAction,
        },
        Stimulus::Recheck => {
            if inputs.pending_save_count == 0 {
                return TriggerDecision::NoAction;
            }
            match inputs.last_change_at {
                Some(at) if now >= at + period => TriggerDecision::Trigger,
                Some(at) => TriggerDecision::Reschedule(at + period),
                None => TriggerDecision::Trigger,
            }
        }
    }
}

/// Combine several rules: any trigger wins, otherwise the earliest deadline.
pub fn evaluate_all(rules: &[Rule], inputs: &RuleInputs<'_>, stimulus: Stimulus, now: Instant) -> TriggerDecision {
    let mut earliest: Option<Instant> = None;
    for rule in rules {
        match evaluate(rule, inputs, stimulus, now) {
            TriggerDecision::Trigger => return TriggerDecision::Trigger,
            TriggerDecision::Reschedule(at) => {
                earliest = Some(earliest.map_or(at, |e| e.min(at)));
            }
            TriggerDecision::NoAction => {}
        }
    }
    earliest.map_or(TriggerDecision::NoAction, TriggerDecision::Reschedule)
}
