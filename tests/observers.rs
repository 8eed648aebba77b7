// tests/observers.rs

mod common;
use crate::common::TestResult;

use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use savepoint::fs::mock::MockFileSystem;
use savepoint::observers::{deliver, spawn_observer, JsonEventLog, ObservedEvent, Observer};
use savepoint::pipeline::{ActionResult, FailureKind};
use savepoint::state::{Notification, RepoRuntimeState, RepoSnapshot, StateStore};
use savepoint::types::{RepoId, RepoStatus};
use savepoint_test_utils::builders::edit_group;

fn snapshot(id: &str, status: RepoStatus, pending: u32) -> RepoSnapshot {
    let state = RepoRuntimeState {
        status,
        pending_save_count: pending,
        ..RepoRuntimeState::default()
    };
    RepoSnapshot::capture(&RepoId::new(id), &state, Instant::now())
}

fn state_changed(id: &str, old: RepoStatus, new: RepoStatus) -> Notification {
    Notification::StateChanged {
        repo_id: RepoId::new(id),
        old,
        new,
        snapshot: snapshot(id, new, 1),
    }
}

#[derive(Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Observer for Recorder {
    fn on_state_change(&mut self, repo_id: &RepoId, old: RepoStatus, new: RepoStatus, _: &RepoSnapshot) {
        self.seen.lock().unwrap().push(format!("{repo_id}: {old} -> {new}"));
    }

    fn on_event(&mut self, repo_id: &RepoId, event: ObservedEvent<'_>) {
        let line = match event {
            ObservedEvent::Changes(group) => format!("{repo_id}: changes {}", group.paths.len()),
            ObservedEvent::Action(result) => format!("{repo_id}: action success={}", result.success),
            ObservedEvent::Error(message) => format!("{repo_id}: error {message}"),
            ObservedEvent::Removed => format!("{repo_id}: removed"),
        };
        self.seen.lock().unwrap().push(line);
    }
}

#[test]
fn store_keeps_latest_snapshot_per_repository() {
    let store = StateStore::new(16);

    store.publish(Notification::Updated {
        snapshot: snapshot("b", RepoStatus::Idle, 0),
    });
    store.publish(state_changed("a", RepoStatus::Idle, RepoStatus::Active));
    store.publish(Notification::Updated {
        snapshot: snapshot("a", RepoStatus::Active, 4),
    });

    let a = store.get(&RepoId::new("a")).expect("snapshot for a");
    assert_eq!(a.status, RepoStatus::Active);
    assert_eq!(a.pending_save_count, 4);

    let ids: Vec<String> = store.all().into_iter().map(|s| s.repo_id.to_string()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    store.publish(Notification::Removed {
        repo_id: RepoId::new("a"),
    });
    assert!(store.get(&RepoId::new("a")).is_none());
}

#[test]
fn deliver_routes_to_the_matching_callback() {
    let mut recorder = Recorder::default();
    let seen = Arc::clone(&recorder.seen);

    deliver(&mut recorder, &state_changed("notes", RepoStatus::Idle, RepoStatus::Active));
    deliver(
        &mut recorder,
        &Notification::Updated {
            snapshot: snapshot("notes", RepoStatus::Active, 1),
        },
    );
    deliver(
        &mut recorder,
        &Notification::Changes {
            repo_id: RepoId::new("notes"),
            group: edit_group("a.md"),
        },
    );
    deliver(
        &mut recorder,
        &Notification::Error {
            repo_id: RepoId::new("notes"),
            message: "boom".to_string(),
        },
    );

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "notes: IDLE -> ACTIVE".to_string(),
            "notes: changes 1".to_string(),
            "notes: error boom".to_string(),
        ]
    );
}

/// Blocks its thread in `on_state_change` until the gate opens.
struct Gated {
    gate: mpsc::Receiver<()>,
    opened: Arc<Mutex<Vec<bool>>>,
}

impl Observer for Gated {
    fn on_state_change(&mut self, _: &RepoId, _: RepoStatus, _: RepoStatus, _: &RepoSnapshot) {
        let opened = self.gate.recv_timeout(Duration::from_secs(5)).is_ok();
        self.opened.lock().unwrap().push(opened);
    }

    fn on_event(&mut self, _: &RepoId, _: ObservedEvent<'_>) {}
}

#[tokio::test]
async fn blocking_observer_leaves_the_runtime_free() -> TestResult {
    let store = StateStore::new(16);
    let (open, gate) = mpsc::channel();
    let opened = Arc::new(Mutex::new(Vec::new()));
    let handle = spawn_observer(
        &store,
        Gated {
            gate,
            opened: Arc::clone(&opened),
        },
    );

    store.publish(state_changed("notes", RepoStatus::Idle, RepoStatus::Active));
    // Single-threaded runtime: this only wakes up if the observer isn't on it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    open.send(())?;

    drop(store);
    handle.await?;
    assert_eq!(*opened.lock().unwrap(), vec![true]);
    Ok(())
}

#[tokio::test]
async fn spawned_observer_sees_published_notifications() -> TestResult {
    let store = StateStore::new(16);
    let recorder = Recorder::default();
    let seen = Arc::clone(&recorder.seen);
    let handle = spawn_observer(&store, recorder);

    store.publish(state_changed("notes", RepoStatus::Active, RepoStatus::Committing));
    store.publish(Notification::Action {
        repo_id: RepoId::new("notes"),
        result: ActionResult::failed(FailureKind::Engine, "boom"),
    });
    // Dropping the last sender closes the stream and ends the task.
    drop(store);
    handle.await?;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "notes: ACTIVE -> COMMITTING".to_string(),
            "notes: action success=false".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn event_log_writes_one_json_object_per_line() -> TestResult {
    let fs = MockFileSystem::new();
    let path = Path::new("/var/log/savepoint/events.ndjson");
    let mut log = JsonEventLog::new(Arc::new(fs.clone()), path);

    deliver(&mut log, &state_changed("notes", RepoStatus::Idle, RepoStatus::Active));
    deliver(
        &mut log,
        &Notification::Changes {
            repo_id: RepoId::new("notes"),
            group: edit_group("a.md"),
        },
    );
    deliver(
        &mut log,
        &Notification::Action {
            repo_id: RepoId::new("notes"),
            result: ActionResult::failed(FailureKind::Conflict, "merge conflicts detected in 1 path(s)"),
        },
    );
    deliver(
        &mut log,
        &Notification::Removed {
            repo_id: RepoId::new("notes"),
        },
    );

    let contents = fs.contents(path).ok_or("event log not written")?;
    let records: Vec<Value> = contents
        .lines()
        .map(serde_json::from_str::<Value>)
        .collect::<Result<_, _>>()?;
    assert_eq!(records.len(), 4);

    for record in &records {
        assert_eq!(record["repo_id"], "notes");
        assert!(record["timestamp"].is_string());
    }
    let kinds: Vec<&str> = records.iter().filter_map(|r| r["kind"].as_str()).collect();
    assert_eq!(kinds, vec!["state_changed", "changes", "action", "removed"]);

    assert_eq!(records[0]["payload"]["old"], "IDLE");
    assert_eq!(records[0]["payload"]["new"], "ACTIVE");
    assert_eq!(records[0]["payload"]["snapshot"]["pending_save_count"], 1);
    assert_eq!(records[1]["payload"]["paths"][0], "a.md");
    assert_eq!(records[1]["payload"]["operation"], "simple_edit");
    assert_eq!(records[2]["payload"]["success"], false);
    assert_eq!(records[2]["payload"]["error"]["kind"], "conflict");
    assert!(records[3]["payload"].is_null());
    Ok(())
}
