// crates/test-utils/src/inline_backend.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use savepoint::config::RepositoryConfig;
use savepoint::exec::{ActionBackend, ActionFuture, StageSink};
use savepoint::orchestrator::BackendFactory;
use savepoint::pipeline::{run_pipeline, ActionRequest, RetryPolicy};
use savepoint::vcs::Engine;

/// Runs the real pipeline on the calling task against any engine
/// (usually a [`FakeEngine`](crate::FakeEngine)), optionally after a delay.
///
/// Counts concurrent executions so tests can check mutual exclusion.
#[derive(Clone)]
pub struct InlineBackend {
    engine: Arc<dyn Engine>,
    retry: RetryPolicy,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ActionRequest>>>,
}

impl InlineBackend {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            retry: RetryPolicy::immediate(3),
            delay: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep (tokio time) before running the pipeline.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every request executed so far, oldest first.
    pub fn requests(&self) -> Vec<ActionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ActionBackend for InlineBackend {
    fn execute(&self, request: ActionRequest, on_stage: StageSink) -> ActionFuture {
        let this = self.clone();
        Box::pin(async move {
            let current = this.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            this.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if let Some(delay) = this.delay {
                tokio::time::sleep(delay).await;
            }
            this.requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(request.clone());
            let result = run_pipeline(this.engine.as_ref(), &request, &this.retry, on_stage.as_ref());

            this.in_flight.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(repo = %request.repo_id, success = result.success, "inline action finished");
            result
        })
    }
}

/// A factory handing the same backend to every repository.
pub fn single_backend(backend: Arc<dyn ActionBackend>) -> BackendFactory {
    Arc::new(move |_: &RepositoryConfig| -> Arc<dyn ActionBackend> { Arc::clone(&backend) })
}
