// crates/test-utils/src/fake_engine.rs

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use savepoint::vcs::{CommitId, Engine, EngineError, FileChange, FileStatus, WorkingTreeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushFailure {
    /// Network-style failure; retried by the pipeline.
    Unavailable,
    /// Remote refused; not retried.
    Rejected,
}

#[derive(Debug)]
struct FakeState {
    dirty: Vec<FileChange>,
    conflicted: Vec<PathBuf>,
    branch: Option<String>,
    commits: Vec<String>,
    pushes: Vec<(String, String)>,
    push_attempts: usize,
    failing_pushes: usize,
    push_failure: PushFailure,
    failing_commits: usize,
    failing_status: bool,
}

/// A scripted in-memory engine.
///
/// Clones share state, so a test can keep one handle to script the working
/// tree while the pipeline drives another.
#[derive(Debug, Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    /// Clean tree on branch `main`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                dirty: Vec::new(),
                conflicted: Vec::new(),
                branch: Some("main".to_string()),
                commits: Vec::new(),
                pushes: Vec::new(),
                push_attempts: 0,
                failing_pushes: 0,
                push_failure: PushFailure::Unavailable,
                failing_commits: 0,
                failing_status: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `path` as modified in the working tree.
    pub fn touch(&self, path: &str) {
        self.change(path, FileStatus::Modified);
    }

    pub fn change(&self, path: &str, status: FileStatus) {
        let mut state = self.lock();
        let path = PathBuf::from(path);
        state.dirty.retain(|c| c.path != path);
        state.dirty.push(FileChange { path, status });
    }

    pub fn add_conflict(&self, path: &str) {
        self.lock().conflicted.push(PathBuf::from(path));
    }

    pub fn set_branch(&self, branch: Option<&str>) {
        self.lock().branch = branch.map(str::to_string);
    }

    pub fn fail_next_commits(&self, n: usize) {
        self.lock().failing_commits = n;
    }

    /// The next `n` pushes fail with a transient network error.
    pub fn fail_next_pushes(&self, n: usize) {
        let mut state = self.lock();
        state.failing_pushes = n;
        state.push_failure = PushFailure::Unavailable;
    }

    /// The next `n` pushes are refused by the remote.
    pub fn reject_next_pushes(&self, n: usize) {
        let mut state = self.lock();
        state.failing_pushes = n;
        state.push_failure = PushFailure::Rejected;
    }

    pub fn fail_status(&self, failing: bool) {
        self.lock().failing_status = failing;
    }

    /// Messages of every commit made so far, oldest first.
    pub fn commits(&self) -> Vec<String> {
        self.lock().commits.clone()
    }

    /// Successful pushes as `(remote, branch)`.
    pub fn pushes(&self) -> Vec<(String, String)> {
        self.lock().pushes.clone()
    }

    pub fn push_attempts(&self) -> usize {
        self.lock().push_attempts
    }

    pub fn is_clean(&self) -> bool {
        self.lock().dirty.is_empty()
    }
}

impl Engine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn status(&self) -> Result<WorkingTreeStatus, EngineError> {
        let state = self.lock();
        if state.failing_status {
            return Err(EngineError::Command {
                op: "fake status",
                detail: "scripted failure".to_string(),
            });
        }
        Ok(WorkingTreeStatus {
            changes: state.dirty.clone(),
            conflicted: state.conflicted.clone(),
            branch: state.branch.clone(),
        })
    }

    fn stage_all(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<CommitId, EngineError> {
        let mut state = self.lock();
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(EngineError::Command {
                op: "fake commit",
                detail: "scripted failure".to_string(),
            });
        }
        if state.dirty.is_empty() {
            return Err(EngineError::Command {
                op: "fake commit",
                detail: "nothing to commit".to_string(),
            });
        }
        state.dirty.clear();
        state.commits.push(message.to_string());
        Ok(CommitId(format!("{:040x}", state.commits.len())))
    }

    fn push(&self, remote: &str, branch: &str) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.push_attempts += 1;
        if state.failing_pushes > 0 {
            state.failing_pushes -= 1;
            let detail = "scripted failure".to_string();
            return Err(match state.push_failure {
                PushFailure::Unavailable => EngineError::PushUnavailable {
                    remote: remote.to_string(),
                    detail,
                },
                PushFailure::Rejected => EngineError::PushRejected {
                    remote: remote.to_string(),
                    detail,
                },
            });
        }
        state.pushes.push((remote.to_string(), branch.to_string()));
        Ok(())
    }
}
