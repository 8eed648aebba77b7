// crates/test-utils/src/lib.rs

pub mod builders;
pub mod fake_engine;
pub mod inline_backend;

use std::sync::Once;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, EnvFilter};

use savepoint::state::Notification;
use savepoint::types::{RepoId, RepoStatus};

pub use fake_engine::FakeEngine;
pub use inline_backend::{single_backend, InlineBackend};

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness's capture.
///
/// Output only shows for failing tests (or with `--nocapture`). The filter
/// comes from `SAVEPOINT_LOG`, same as the binary, so
/// `SAVEPOINT_LOG=savepoint::orchestrator=trace` narrows it to one module.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env(savepoint::logging::LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new("warn,savepoint=info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(false)
            .try_init();
    });
}

/// Run a future with a 30-second timeout (virtual time under `start_paused`).
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(30), f)
        .await
        .expect("Test timed out after 30 seconds")
}

/// Wait for the first notification matching `pred`, skipping everything else.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<Notification>, mut pred: F) -> Notification
where
    F: FnMut(&Notification) -> bool,
{
    with_timeout(async {
        loop {
            match rx.recv().await {
                Ok(n) if pred(&n) => return n,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("notification stream closed"),
            }
        }
    })
    .await
}

/// Wait until `repo` transitions into `status`.
pub async fn wait_for_status(rx: &mut broadcast::Receiver<Notification>, repo: &RepoId, status: RepoStatus) {
    wait_for(rx, |n| {
        matches!(n, Notification::StateChanged { repo_id, new, .. } if repo_id == repo && *new == status)
    })
    .await;
}

/// Wait for the next action result of `repo`.
pub async fn wait_for_action(
    rx: &mut broadcast::Receiver<Notification>,
    repo: &RepoId,
) -> savepoint::pipeline::ActionResult {
    match wait_for(rx, |n| matches!(n, Notification::Action { repo_id, .. } if repo_id == repo)).await {
        Notification::Action { result, .. } => result,
        other => unreachable!("filtered for actions, got {other:?}"),
    }
}
