// src/observers/event_log.rs

//! Append-only NDJSON record of everything that happened.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::fs::FileSystem;
use crate::state::RepoSnapshot;
use crate::types::{RepoId, RepoStatus};

use super::{ObservedEvent, Observer};

#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    repo_id: &'a RepoId,
    timestamp: DateTime<Utc>,
    kind: &'a str,
    payload: Value,
}

/// Writes one JSON object per line. Never read back by savepoint.
#[derive(Debug)]
pub struct JsonEventLog {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl JsonEventLog {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    fn write(&self, repo_id: &RepoId, kind: &str, payload: Value) {
        let record = EventRecord {
            repo_id,
            timestamp: Utc::now(),
            kind,
            payload,
        };
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialise event record");
                return;
            }
        };
        line.push(b'\n');
        if let Err(e) = self.fs.append(&self.path, &line) {
            warn!(path = ?self.path, error = %e, "failed to append event record");
        }
    }
}

impl Observer for JsonEventLog {
    fn on_state_change(&mut self, repo_id: &RepoId, old: RepoStatus, new: RepoStatus, snapshot: &RepoSnapshot) {
        self.write(
            repo_id,
            "state_changed",
            json!({ "old": old, "new": new, "snapshot": snapshot }),
        );
    }

    fn on_event(&mut self, repo_id: &RepoId, event: ObservedEvent<'_>) {
        let (kind, payload) = match event {
            ObservedEvent::Changes(group) => ("changes", json!(group)),
            ObservedEvent::Action(result) => ("action", json!(result)),
            ObservedEvent::Error(message) => ("error", json!({ "message": message })),
            ObservedEvent::Removed => ("removed", Value::Null),
        };
        self.write(repo_id, kind, payload);
    }
}
