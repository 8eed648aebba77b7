// src/orchestrator/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::exec::{ActionBackend, StageSink};
use crate::pipeline::{ActionRequest, ActionResult, FailureKind};
use crate::state::{Notification, StateStore};

use super::core::RepoMachine;
use super::{RepoCommand, RepoEvent};

/// Per-repository mutual exclusion for the action pipeline.
///
/// Owned by the [`Orchestrator`](super::Orchestrator), not the runtime, so an
/// action started before a reload still excludes the replacement runtime.
pub type ExecutionLock = Arc<Mutex<()>>;

/// Async IO shell around one [`RepoMachine`].
///
/// All events for the repository (changes, timer expiry, action completion,
/// control requests) arrive through one queue, so they are handled in a
/// single total order.
pub struct RepoRuntime {
    machine: RepoMachine,
    event_rx: mpsc::UnboundedReceiver<RepoEvent>,
    event_tx: mpsc::UnboundedSender<RepoEvent>,
    backend: Arc<dyn ActionBackend>,
    lock: ExecutionLock,
    store: StateStore,
    timer: Option<JoinHandle<()>>,
}

impl fmt::Debug for RepoRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoRuntime")
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

impl RepoRuntime {
    pub fn new(
        machine: RepoMachine,
        event_rx: mpsc::UnboundedReceiver<RepoEvent>,
        event_tx: mpsc::UnboundedSender<RepoEvent>,
        backend: Arc<dyn ActionBackend>,
        lock: ExecutionLock,
        store: StateStore,
    ) -> Self {
        Self {
            machine,
            event_rx,
            event_tx,
            backend,
            lock,
            store,
            timer: None,
        }
    }

    /// Main event loop; returns once the machine stops or every sender is gone.
    pub async fn run(mut self) {
        let repo = self.machine.id().clone();
        info!(repo = %repo, "repository runtime started");
        self.store.publish(Notification::Updated {
            snapshot: self.machine.snapshot(Instant::now()),
        });

        while let Some(event) = self.event_rx.recv().await {
            debug!(repo = %repo, ?event, "repository event");

            let step = self.machine.step(event, Instant::now());
            for command in step.commands {
                self.execute_command(command);
            }

            if !step.keep_running {
                break;
            }
        }

        self.abort_timer();
        info!(repo = %repo, "repository runtime stopped");
    }

    fn execute_command(&mut self, command: RepoCommand) {
        match command {
            RepoCommand::ArmTimer { token, deadline } => {
                self.abort_timer();
                let tx = self.event_tx.clone();
                self.timer = Some(tokio::spawn(async move {
                    sleep_until(deadline).await;
                    let _ = tx.send(RepoEvent::TimerFired { token });
                }));
            }
            RepoCommand::CancelTimer => self.abort_timer(),
            RepoCommand::RunAction(request) => self.spawn_action(request),
            RepoCommand::Publish(notification) => self.store.publish(notification),
        }
    }

    fn abort_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }

    fn spawn_action(&mut self, request: ActionRequest) {
        let tx = self.event_tx.clone();

        let guard = match Arc::clone(&self.lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                let _ = tx.send(RepoEvent::LockBusy);
                let lock = Arc::clone(&self.lock);
                tokio::spawn(async move {
                    drop(lock.lock_owned().await);
                    let _ = tx.send(RepoEvent::LockReleased);
                });
                return;
            }
        };

        let progress_tx = tx.clone();
        let on_stage: StageSink = Arc::new(move |stage| {
            let _ = progress_tx.send(RepoEvent::ActionProgress(stage));
        });
        let action = self.backend.execute(request, on_stage);

        tokio::spawn(async move {
            // The inner task isolates panics so the guard is always released
            // and a completion is always reported.
            let result = match tokio::spawn(action).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(error = %err, "action task failed");
                    ActionResult::failed(FailureKind::Engine, format!("action task failed: {err}"))
                }
            };
            drop(guard);
            let _ = tx.send(RepoEvent::ActionCompleted(result));
        });
    }
}
