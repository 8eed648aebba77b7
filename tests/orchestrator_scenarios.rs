// tests/orchestrator_scenarios.rs

mod common;
use crate::common::{init_tracing, TestResult};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use savepoint::errors::SavepointError;
use savepoint::orchestrator::{Orchestrator, RepoPolicy};
use savepoint::pipeline::FailureKind;
use savepoint::state::StateStore;
use savepoint::types::{RepoId, RepoStatus};
use savepoint_test_utils::builders::{edit_group, RepositoryConfigBuilder};
use savepoint_test_utils::{single_backend, wait_for_action, wait_for_status, FakeEngine, InlineBackend};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn orchestrator(store: &StateStore, backend: InlineBackend) -> Orchestrator {
    Orchestrator::new(store.clone(), single_backend(Arc::new(backend)), RepoPolicy::default())
}

#[tokio::test(start_paused = true)]
async fn inactivity_commits_three_seconds_after_the_last_save() -> TestResult {
    init_tracing();
    let engine = FakeEngine::new();
    let store = StateStore::new(256);
    let mut rx = store.subscribe();
    let mut orch = orchestrator(&store, InlineBackend::new(Arc::new(engine.clone())));

    let repo = RepositoryConfigBuilder::new("notes").inactivity(secs(3)).build();
    let id = repo.id.clone();
    orch.start(&[repo]);

    let start = Instant::now();
    for path in ["a.md", "b.md", "c.md"] {
        engine.touch(path);
        orch.dispatch(&id, edit_group(path))?;
        sleep(secs(1)).await;
    }
    assert!(engine.commits().is_empty());

    let result = wait_for_action(&mut rx, &id).await;
    let elapsed = Instant::now() - start;
    assert!(result.success);
    assert!(elapsed >= secs(5) && elapsed < secs(6), "committed after {elapsed:?}");

    let commits = engine.commits();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].starts_with("savepoint: 3 save(s) at "), "{}", commits[0]);
    assert!(commits[0].contains("Modified (3):"), "{}", commits[0]);
    for path in ["a.md", "b.md", "c.md"] {
        assert!(commits[0].contains(&format!("  M {path}")), "{}", commits[0]);
    }

    let snapshot = orch.snapshot(&id).ok_or("no snapshot")?;
    assert_eq!(snapshot.status, RepoStatus::Idle);
    assert_eq!(snapshot.pending_save_count, 0);
    assert!(snapshot.last_commit_id.is_some());

    orch.shutdown(secs(1)).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn save_count_commits_on_the_tenth_save() -> TestResult {
    init_tracing();
    let engine = FakeEngine::new();
    let store = StateStore::new(256);
    let mut rx = store.subscribe();
    let mut orch = orchestrator(&store, InlineBackend::new(Arc::new(engine.clone())));

    let repo = RepositoryConfigBuilder::new("code").save_count(10).build();
    let id = repo.id.clone();
    orch.start(&[repo]);

    for i in 0..9 {
        let path = format!("src/file{i}.rs");
        engine.touch(&path);
        orch.dispatch(&id, edit_group(&path))?;
    }
    sleep(ms(100)).await;
    assert!(engine.commits().is_empty());
    assert_eq!(orch.snapshot(&id).ok_or("no snapshot")?.pending_save_count, 9);

    engine.touch("src/file9.rs");
    orch.dispatch(&id, edit_group("src/file9.rs"))?;

    let result = wait_for_action(&mut rx, &id).await;
    assert!(result.success);
    let commits = engine.commits();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].starts_with("savepoint: 10 save(s)"));
    assert!(commits[0].contains("Modified (10):"));

    orch.shutdown(secs(1)).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_push_is_retried_by_the_next_trigger() -> TestResult {
    init_tracing();
    let engine = FakeEngine::new();
    engine.fail_next_pushes(3);
    let store = StateStore::new(256);
    let mut rx = store.subscribe();
    let mut orch = orchestrator(&store, InlineBackend::new(Arc::new(engine.clone())));

    let repo = RepositoryConfigBuilder::new("notes")
        .manual()
        .auto_push("origin")
        .build();
    let id = repo.id.clone();
    orch.start(&[repo]);

    engine.touch("notes.md");
    orch.dispatch(&id, edit_group("notes.md"))?;
    orch.trigger_now(&id)?;

    let first = wait_for_action(&mut rx, &id).await;
    assert!(first.success);
    assert!(first.commit_id.is_some());
    assert!(!first.pushed);
    assert_eq!(first.failure_kind(), Some(FailureKind::Push));
    assert_eq!(engine.push_attempts(), 3);

    let snapshot = orch.snapshot(&id).ok_or("no snapshot")?;
    assert!(snapshot.push_pending);
    assert_eq!(snapshot.pending_save_count, 0);
    assert_eq!(snapshot.status, RepoStatus::Idle);

    orch.trigger_now(&id)?;
    let second = wait_for_action(&mut rx, &id).await;
    assert!(second.success);
    assert!(second.skipped);
    assert!(second.pushed);
    assert_eq!(engine.commits().len(), 1);
    assert_eq!(engine.pushes(), vec![("origin".to_string(), "main".to_string())]);
    assert!(!orch.snapshot(&id).ok_or("no snapshot")?.push_pending);

    orch.shutdown(secs(1)).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn conflicts_freeze_until_resumed() -> TestResult {
    init_tracing();
    let engine = FakeEngine::new();
    engine.add_conflict("notes.md");
    let store = StateStore::new(256);
    let mut rx = store.subscribe();
    let mut orch = orchestrator(&store, InlineBackend::new(Arc::new(engine.clone())));

    let repo = RepositoryConfigBuilder::new("notes").save_count(1).build();
    let id = repo.id.clone();
    orch.start(&[repo]);

    engine.touch("notes.md");
    orch.dispatch(&id, edit_group("notes.md"))?;
    let result = wait_for_action(&mut rx, &id).await;
    assert_eq!(result.failure_kind(), Some(FailureKind::Conflict));
    assert_eq!(orch.snapshot(&id).ok_or("no snapshot")?.status, RepoStatus::Frozen);

    // More saves are recorded but never committed while frozen.
    orch.dispatch(&id, edit_group("notes.md"))?;
    sleep(ms(100)).await;
    assert!(engine.commits().is_empty());
    assert_eq!(orch.snapshot(&id).ok_or("no snapshot")?.pending_save_count, 2);

    // Resuming re-evaluates; the conflict is still there, so it freezes again.
    orch.resume(&id)?;
    let again = wait_for_action(&mut rx, &id).await;
    assert_eq!(again.failure_kind(), Some(FailureKind::Conflict));
    let snapshot = orch.snapshot(&id).ok_or("no snapshot")?;
    assert_eq!(snapshot.status, RepoStatus::Frozen);
    assert!(snapshot.status_reason.as_deref().is_some_and(|r| r.contains("conflict")));
    assert!(engine.commits().is_empty());

    orch.shutdown(secs(1)).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_through_the_orchestrator() -> TestResult {
    init_tracing();
    let engine = FakeEngine::new();
    let store = StateStore::new(256);
    let mut rx = store.subscribe();
    let mut orch = orchestrator(&store, InlineBackend::new(Arc::new(engine.clone())));

    let repo = RepositoryConfigBuilder::new("notes").save_count(1).build();
    let id = repo.id.clone();
    orch.start(&[repo]);

    orch.pause(&id, Some("manual inspection".to_string()))?;
    wait_for_status(&mut rx, &id, RepoStatus::Paused).await;
    let snapshot = orch.snapshot(&id).ok_or("no snapshot")?;
    assert_eq!(snapshot.status_reason.as_deref(), Some("manual inspection"));

    engine.touch("notes.md");
    orch.dispatch(&id, edit_group("notes.md"))?;
    sleep(ms(100)).await;
    assert!(engine.commits().is_empty());

    orch.resume(&id)?;
    let result = wait_for_action(&mut rx, &id).await;
    assert!(result.success);
    assert_eq!(engine.commits().len(), 1);

    orch.shutdown(secs(1)).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn control_requests_for_unknown_repositories_fail() -> TestResult {
    let store = StateStore::new(16);
    let orch = orchestrator(&store, InlineBackend::new(Arc::new(FakeEngine::new())));
    let missing = RepoId::new("missing");

    assert!(matches!(
        orch.trigger_now(&missing),
        Err(SavepointError::UnknownRepository(id)) if id == "missing"
    ));
    assert!(matches!(orch.resume(&missing), Err(SavepointError::UnknownRepository(_))));
    assert!(matches!(
        orch.dispatch(&missing, edit_group("a")),
        Err(SavepointError::UnknownRepository(_))
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn disabled_repositories_are_not_started() -> TestResult {
    let store = StateStore::new(16);
    let mut orch = orchestrator(&store, InlineBackend::new(Arc::new(FakeEngine::new())));

    let started = orch.start(&[
        RepositoryConfigBuilder::new("on").build(),
        RepositoryConfigBuilder::new("off").disabled().build(),
    ]);

    assert_eq!(started, vec![RepoId::new("on")]);
    assert_eq!(orch.repo_ids(), vec![RepoId::new("on")]);
    orch.shutdown(secs(1)).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reload_adds_removes_and_restarts_repositories() -> TestResult {
    init_tracing();
    let store = StateStore::new(256);
    let mut orch = orchestrator(&store, InlineBackend::new(Arc::new(FakeEngine::new())));

    orch.start(&[
        RepositoryConfigBuilder::new("a").manual().build(),
        RepositoryConfigBuilder::new("b").manual().build(),
        RepositoryConfigBuilder::new("d").manual().build(),
    ]);
    sleep(ms(10)).await;
    assert!(store.get(&RepoId::new("d")).is_some());

    let report = orch
        .reload(
            &[
                RepositoryConfigBuilder::new("a").manual().build(),
                RepositoryConfigBuilder::new("b").save_count(5).build(),
                RepositoryConfigBuilder::new("c").manual().build(),
            ],
            secs(1),
        )
        .await;

    assert_eq!(report.added, vec![RepoId::new("c")]);
    assert_eq!(report.removed, vec![RepoId::new("d")]);
    assert_eq!(report.restarted, vec![RepoId::new("b")]);
    assert_eq!(report.unchanged, vec![RepoId::new("a")]);
    assert_eq!(
        orch.repo_ids(),
        vec![RepoId::new("a"), RepoId::new("b"), RepoId::new("c")]
    );

    sleep(ms(10)).await;
    assert!(store.get(&RepoId::new("d")).is_none());
    assert!(store.get(&RepoId::new("c")).is_some());

    orch.shutdown(secs(1)).await;
    assert!(orch.repo_ids().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_in_flight_actions_within_grace() -> TestResult {
    init_tracing();
    let engine = FakeEngine::new();
    let store = StateStore::new(256);
    let mut rx = store.subscribe();
    let backend = InlineBackend::new(Arc::new(engine.clone())).with_delay(secs(2));
    let mut orch = orchestrator(&store, backend);

    let repo = RepositoryConfigBuilder::new("notes").manual().build();
    let id = repo.id.clone();
    orch.start(&[repo]);

    engine.touch("notes.md");
    orch.dispatch(&id, edit_group("notes.md"))?;
    orch.trigger_now(&id)?;
    wait_for_status(&mut rx, &id, RepoStatus::Committing).await;

    orch.shutdown(secs(10)).await;
    assert_eq!(engine.commits().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_actions_past_the_grace_period() -> TestResult {
    init_tracing();
    let engine = FakeEngine::new();
    let store = StateStore::new(256);
    let mut rx = store.subscribe();
    let backend = InlineBackend::new(Arc::new(engine.clone())).with_delay(secs(30));
    let mut orch = orchestrator(&store, backend);

    let repo = RepositoryConfigBuilder::new("notes").manual().build();
    let id = repo.id.clone();
    orch.start(&[repo]);

    engine.touch("notes.md");
    orch.trigger_now(&id)?;
    wait_for_status(&mut rx, &id, RepoStatus::Committing).await;

    let start = Instant::now();
    orch.shutdown(secs(1)).await;
    assert!(Instant::now() - start < secs(2));
    assert!(engine.commits().is_empty());
    Ok(())
}
