// src/state/store.rs

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tracing::trace;

use crate::pipeline::ActionResult;
use crate::types::{ChangeGroup, RepoId, RepoStatus};

use super::RepoSnapshot;

/// Something observers may want to hear about.
#[derive(Debug, Clone)]
pub enum Notification {
    StateChanged {
        repo_id: RepoId,
        old: RepoStatus,
        new: RepoStatus,
        snapshot: RepoSnapshot,
    },
    /// Snapshot refresh without a status change (e.g. pending count moved).
    Updated { snapshot: RepoSnapshot },
    Changes { repo_id: RepoId, group: ChangeGroup },
    Action { repo_id: RepoId, result: ActionResult },
    Error { repo_id: RepoId, message: String },
    Removed { repo_id: RepoId },
}

impl Notification {
    pub fn repo_id(&self) -> &RepoId {
        match self {
            Notification::StateChanged { repo_id, .. }
            | Notification::Changes { repo_id, .. }
            | Notification::Action { repo_id, .. }
            | Notification::Error { repo_id, .. }
            | Notification::Removed { repo_id } => repo_id,
            Notification::Updated { snapshot } => &snapshot.repo_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::StateChanged { .. } => "state_changed",
            Notification::Updated { .. } => "updated",
            Notification::Changes { .. } => "changes",
            Notification::Action { .. } => "action",
            Notification::Error { .. } => "error",
            Notification::Removed { .. } => "removed",
        }
    }
}

/// In-memory snapshots of every repository plus a fire-and-forget broadcast.
///
/// Publishing never blocks: slow subscribers lag and skip messages instead.
#[derive(Debug, Clone)]
pub struct StateStore {
    snapshots: Arc<RwLock<HashMap<RepoId, RepoSnapshot>>>,
    tx: broadcast::Sender<Notification>,
}

impl StateStore {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn publish(&self, notification: Notification) {
        match &notification {
            Notification::StateChanged { snapshot, .. } | Notification::Updated { snapshot } => {
                self.write()
                    .insert(snapshot.repo_id.clone(), snapshot.clone());
            }
            Notification::Removed { repo_id } => {
                self.write().remove(repo_id);
            }
            _ => {}
        }
        // No subscribers is fine.
        if self.tx.send(notification).is_err() {
            trace!("notification dropped; no subscribers");
        }
    }

    pub fn get(&self, repo_id: &RepoId) -> Option<RepoSnapshot> {
        self.read().get(repo_id).cloned()
    }

    /// All snapshots, ordered by repository id.
    pub fn all(&self) -> Vec<RepoSnapshot> {
        let mut all: Vec<_> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.repo_id.cmp(&b.repo_id));
        all
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RepoId, RepoSnapshot>> {
        self.snapshots.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RepoId, RepoSnapshot>> {
        self.snapshots.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(256)
    }
}
