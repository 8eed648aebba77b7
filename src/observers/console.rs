// src/observers/console.rs

use tracing::{error, info, warn};

use crate::state::RepoSnapshot;
use crate::types::{RepoId, RepoStatus};

use super::{ObservedEvent, Observer};

/// Headless status printer; everything goes through `tracing`.
#[derive(Debug, Default)]
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_state_change(&mut self, repo_id: &RepoId, old: RepoStatus, new: RepoStatus, snapshot: &RepoSnapshot) {
        match new {
            RepoStatus::Frozen | RepoStatus::Error => warn!(
                repo = %repo_id,
                %old,
                %new,
                reason = snapshot.status_reason.as_deref().or(snapshot.last_error.as_deref()).unwrap_or(""),
                "repository needs attention"
            ),
            _ => info!(
                repo = %repo_id,
                %old,
                %new,
                pending = snapshot.pending_save_count,
                "state changed"
            ),
        }
    }

    fn on_event(&mut self, repo_id: &RepoId, event: ObservedEvent<'_>) {
        match event {
            ObservedEvent::Changes(group) => info!(
                repo = %repo_id,
                operation = %group.operation,
                files = group.paths.len(),
                "change recorded"
            ),
            ObservedEvent::Action(result) => {
                if let Some(failure) = &result.error {
                    warn!(repo = %repo_id, kind = ?failure.kind, message = %failure.message, "action finished with error");
                } else if let Some(commit) = &result.commit_id {
                    info!(repo = %repo_id, commit = %commit.short(), pushed = result.pushed, "checkpoint saved");
                } else {
                    info!(repo = %repo_id, "nothing to commit");
                }
            }
            ObservedEvent::Error(message) => error!(repo = %repo_id, %message, "repository error"),
            ObservedEvent::Removed => info!(repo = %repo_id, "repository removed"),
        }
    }
}
