// src/orchestrator/mod.rs

//! Per-repository orchestration.
//!
//! Split the same way as the rest of the crate:
//! - [`core`] / [`transitions`]: a pure, synchronous state machine
//!   (`RepoMachine::step(event, now) -> RepoStep`).
//! - [`runtime`]: the async shell that owns one machine, its event queue,
//!   its timer task and its execution lock.
//! - [`supervisor`]: the [`Orchestrator`] that starts, reloads, controls and
//!   shuts down all repository runtimes.

pub mod core;
pub mod guard;
pub mod runtime;
pub mod supervisor;
pub mod transitions;

use std::time::Duration;

use tokio::time::Instant;

use crate::pipeline::{ActionRequest, ActionResult, PipelineStage};
use crate::state::Notification;
use crate::types::{ChangeGroup, TimerToken};

pub use self::core::{RepoMachine, RepoSettings, RepoStep};
pub use guard::BulkChangeGuard;
pub use runtime::{ExecutionLock, RepoRuntime};
pub use supervisor::{BackendFactory, Orchestrator, ReloadReport};

/// Everything a repository runtime reacts to, in arrival order.
#[derive(Debug, Clone)]
pub enum RepoEvent {
    Changes(ChangeGroup),
    TimerFired { token: TimerToken },
    ActionProgress(PipelineStage),
    ActionCompleted(ActionResult),
    /// The execution lock was held elsewhere when an action was dispatched.
    LockBusy,
    LockReleased,
    TriggerNow,
    Pause { reason: Option<String> },
    Resume,
    Freeze { reason: String },
    Shutdown,
}

/// Side effects the core asks the runtime shell to perform.
#[derive(Debug, Clone)]
pub enum RepoCommand {
    /// Replace any armed timer with one firing `token` at `deadline`.
    ArmTimer { token: TimerToken, deadline: Instant },
    CancelTimer,
    RunAction(ActionRequest),
    Publish(Notification),
}

/// Orchestrator-wide knobs that apply to every repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPolicy {
    /// Failed actions in a row before ERROR latches until `resume`.
    pub max_consecutive_failures: u32,
    /// Distinct paths within `bulk_change_window` that pause a repository.
    /// Zero disables the check.
    pub bulk_change_threshold: usize,
    pub bulk_change_window: Duration,
}

impl Default for RepoPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            bulk_change_threshold: 0,
            bulk_change_window: Duration::from_secs(5),
        }
    }
}
