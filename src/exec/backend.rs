// src/exec/backend.rs

//! Pluggable action backend abstraction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::pipeline::{run_pipeline, ActionRequest, ActionResult, FailureKind, PipelineStage, RetryPolicy};
use crate::vcs::Engine;

pub type ActionFuture = Pin<Box<dyn Future<Output = ActionResult> + Send + 'static>>;

/// Callback for pipeline progress (e.g. the switch to pushing).
pub type StageSink = Arc<dyn Fn(PipelineStage) + Send + Sync>;

/// Trait abstracting how an action request is executed.
///
/// The returned future must not borrow `self`; the runtime spawns it.
pub trait ActionBackend: Send + Sync {
    fn execute(&self, request: ActionRequest, on_stage: StageSink) -> ActionFuture;
}

/// Production backend: one engine per repository, a worker pool shared by all.
#[derive(Debug, Clone)]
pub struct PipelineBackend {
    engine: Arc<dyn Engine>,
    workers: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl PipelineBackend {
    pub fn new(engine: Arc<dyn Engine>, workers: Arc<Semaphore>, retry: RetryPolicy) -> Self {
        Self {
            engine,
            workers,
            retry,
        }
    }
}

impl ActionBackend for PipelineBackend {
    fn execute(&self, request: ActionRequest, on_stage: StageSink) -> ActionFuture {
        let engine = Arc::clone(&self.engine);
        let workers = Arc::clone(&self.workers);
        let retry = self.retry.clone();

        Box::pin(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return ActionResult::failed(FailureKind::Engine, "worker pool closed"),
            };
            debug!(repo = %request.repo_id, engine = engine.name(), "worker acquired");

            let joined = tokio::task::spawn_blocking(move || {
                run_pipeline(engine.as_ref(), &request, &retry, on_stage.as_ref())
            })
            .await;

            match joined {
                Ok(result) => result,
                Err(err) => ActionResult::failed(FailureKind::Engine, format!("pipeline task failed: {err}")),
            }
        })
    }
}
