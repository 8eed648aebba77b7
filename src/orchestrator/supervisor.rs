// src/orchestrator/supervisor.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::config::RepositoryConfig;
use crate::errors::{Result, SavepointError};
use crate::exec::ActionBackend;
use crate::state::{Notification, RepoSnapshot, StateStore};
use crate::types::{ChangeGroup, RepoId};

use super::core::{RepoMachine, RepoSettings};
use super::runtime::{ExecutionLock, RepoRuntime};
use super::{RepoEvent, RepoPolicy};

/// Builds the action backend for a repository (real pipeline or a test double).
pub type BackendFactory = Arc<dyn Fn(&RepositoryConfig) -> Arc<dyn ActionBackend> + Send + Sync>;

struct RepoHandle {
    config: RepositoryConfig,
    tx: mpsc::UnboundedSender<RepoEvent>,
    join: JoinHandle<()>,
}

/// What a [`Orchestrator::reload`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub added: Vec<RepoId>,
    pub removed: Vec<RepoId>,
    pub restarted: Vec<RepoId>,
    pub unchanged: Vec<RepoId>,
}

/// Owns one runtime per enabled repository.
pub struct Orchestrator {
    repos: BTreeMap<RepoId, RepoHandle>,
    locks: HashMap<RepoId, ExecutionLock>,
    store: StateStore,
    backends: BackendFactory,
    policy: RepoPolicy,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("repos", &self.repos.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(store: StateStore, backends: BackendFactory, policy: RepoPolicy) -> Self {
        Self {
            repos: BTreeMap::new(),
            locks: HashMap::new(),
            store,
            backends,
            policy,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn repo_ids(&self) -> Vec<RepoId> {
        self.repos.keys().cloned().collect()
    }

    pub fn snapshot(&self, id: &RepoId) -> Option<RepoSnapshot> {
        self.store.get(id)
    }

    /// Start a runtime for every enabled repository not already running.
    pub fn start(&mut self, repos: &[RepositoryConfig]) -> Vec<RepoId> {
        let mut started = Vec::new();
        for repo in repos.iter().filter(|r| r.enabled) {
            if self.repos.contains_key(&repo.id) {
                warn!(repo = %repo.id, "repository already running; skipped");
                continue;
            }
            self.spawn_repo(repo.clone());
            started.push(repo.id.clone());
        }
        started
    }

    fn spawn_repo(&mut self, config: RepositoryConfig) {
        let id = config.id.clone();
        let lock = Arc::clone(
            self.locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let machine = RepoMachine::new(id.clone(), RepoSettings::new(&config, &self.policy));
        let backend = (self.backends)(&config);
        let runtime = RepoRuntime::new(machine, rx, tx.clone(), backend, lock, self.store.clone());
        let join = tokio::spawn(runtime.run());

        info!(repo = %id, path = ?config.path, "repository registered");
        self.repos.insert(id, RepoHandle { config, tx, join });
    }

    fn send(&self, id: &RepoId, event: RepoEvent) -> Result<()> {
        let handle = self
            .repos
            .get(id)
            .ok_or_else(|| SavepointError::UnknownRepository(id.to_string()))?;
        handle
            .tx
            .send(event)
            .map_err(|_| SavepointError::RepositoryStopped(id.to_string()))
    }

    /// Hand a change group to its repository.
    pub fn dispatch(&self, id: &RepoId, group: ChangeGroup) -> Result<()> {
        self.send(id, RepoEvent::Changes(group))
    }

    pub fn trigger_now(&self, id: &RepoId) -> Result<()> {
        self.send(id, RepoEvent::TriggerNow)
    }

    pub fn pause(&self, id: &RepoId, reason: Option<String>) -> Result<()> {
        self.send(id, RepoEvent::Pause { reason })
    }

    /// Leave PAUSED, FROZEN or a latched ERROR.
    pub fn resume(&self, id: &RepoId) -> Result<()> {
        self.send(id, RepoEvent::Resume)
    }

    pub fn freeze(&self, id: &RepoId, reason: impl Into<String>) -> Result<()> {
        self.send(id, RepoEvent::Freeze { reason: reason.into() })
    }

    /// Apply a new repository list: start new ones, stop removed or disabled
    /// ones, restart those whose config changed.
    pub async fn reload(&mut self, repos: &[RepositoryConfig], grace: Duration) -> ReloadReport {
        let desired: BTreeMap<RepoId, &RepositoryConfig> = repos
            .iter()
            .filter(|r| r.enabled)
            .map(|r| (r.id.clone(), r))
            .collect();
        let mut report = ReloadReport::default();

        let current: Vec<RepoId> = self.repos.keys().cloned().collect();
        for id in current {
            let changed = match (desired.get(&id), self.repos.get(&id)) {
                (Some(new), Some(handle)) => **new != handle.config,
                _ => true,
            };
            if !changed {
                report.unchanged.push(id);
                continue;
            }
            if let Some(handle) = self.repos.remove(&id) {
                self.stop_repo(&id, handle, Instant::now() + grace).await;
            }
            match desired.get(&id) {
                Some(new) => {
                    self.spawn_repo((*new).clone());
                    report.restarted.push(id);
                }
                None => report.removed.push(id),
            }
        }

        for (id, repo) in desired {
            if !self.repos.contains_key(&id) {
                self.spawn_repo(repo.clone());
                report.added.push(id);
            }
        }

        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            restarted = report.restarted.len(),
            "configuration reloaded"
        );
        report
    }

    /// Stop every repository, waiting up to `grace` for in-flight actions.
    /// Actions still running after that are abandoned and their results dropped.
    pub async fn shutdown(&mut self, grace: Duration) {
        let deadline = Instant::now() + grace;
        let repos = std::mem::take(&mut self.repos);

        for handle in repos.values() {
            let _ = handle.tx.send(RepoEvent::Shutdown);
        }
        for (id, handle) in repos {
            self.stop_repo(&id, handle, deadline).await;
        }
        info!("orchestrator stopped");
    }

    async fn stop_repo(&self, id: &RepoId, mut handle: RepoHandle, deadline: Instant) {
        let _ = handle.tx.send(RepoEvent::Shutdown);
        if timeout_at(deadline, &mut handle.join).await.is_err() {
            warn!(repo = %id, "grace period elapsed; abandoning in-flight action");
            handle.join.abort();
        }
        self.store.publish(Notification::Removed { repo_id: id.clone() });
    }
}
