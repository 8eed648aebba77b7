// src/observers/mod.rs

//! Subscribers to the state store's notification stream.
//!
//! Each observer runs on its own task fed by a broadcast receiver, so a slow
//! observer can only ever lag behind; it never stalls a repository. Callbacks
//! are synchronous and may do file I/O, so they run on the blocking pool.

pub mod console;
pub mod event_log;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::pipeline::ActionResult;
use crate::state::{Notification, RepoSnapshot, StateStore};
use crate::types::{ChangeGroup, RepoId, RepoStatus};

pub use console::ConsoleObserver;
pub use event_log::JsonEventLog;

/// Non-state events forwarded to observers.
#[derive(Debug, Clone, Copy)]
pub enum ObservedEvent<'a> {
    Changes(&'a ChangeGroup),
    Action(&'a ActionResult),
    Error(&'a str),
    Removed,
}

pub trait Observer: Send {
    fn on_state_change(&mut self, repo_id: &RepoId, old: RepoStatus, new: RepoStatus, snapshot: &RepoSnapshot);

    fn on_event(&mut self, repo_id: &RepoId, event: ObservedEvent<'_>);
}

/// Route one notification to the matching observer callback.
pub fn deliver(observer: &mut dyn Observer, notification: &Notification) {
    match notification {
        Notification::StateChanged {
            repo_id,
            old,
            new,
            snapshot,
        } => observer.on_state_change(repo_id, *old, *new, snapshot),
        Notification::Updated { .. } => {}
        Notification::Changes { repo_id, group } => observer.on_event(repo_id, ObservedEvent::Changes(group)),
        Notification::Action { repo_id, result } => observer.on_event(repo_id, ObservedEvent::Action(result)),
        Notification::Error { repo_id, message } => observer.on_event(repo_id, ObservedEvent::Error(message)),
        Notification::Removed { repo_id } => observer.on_event(repo_id, ObservedEvent::Removed),
    }
}

/// Spawn a task that feeds every notification from `store` to `observer`.
pub fn spawn_observer<O>(store: &StateStore, mut observer: O) -> JoinHandle<()>
where
    O: Observer + 'static,
{
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let delivered = tokio::task::spawn_blocking(move || {
                        deliver(&mut observer, &notification);
                        observer
                    })
                    .await;
                    match delivered {
                        Ok(returned) => observer = returned,
                        Err(e) => {
                            warn!(error = %e, "observer panicked; detached");
                            return;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer lagging; notifications skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("observer loop finished");
    })
}
