// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::types::{ChangeEvent, ChangeGroup, ChangeKind, RepoId};
use crate::watch::buffer::{BufferSettings, EventBuffer};
use crate::watch::ignore::IgnoreRules;
use crate::watch::path_utils::{relative_path, slash_str};

/// Placeholder wake-up when nothing is buffered (the branch is disabled then).
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// One repository to watch.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub repo_id: RepoId,
    pub root: PathBuf,
    pub ignore: IgnoreRules,
    pub buffer: BufferSettings,
}

/// A finished change group tagged with the repository it belongs to.
#[derive(Debug, Clone)]
pub struct RoutedGroup {
    pub repo_id: RepoId,
    pub group: ChangeGroup,
}

/// Handle for one repository's filesystem watcher.
///
/// Dropping this handle stops file watching; anything still buffered is
/// flushed to the sink first.
pub struct WatcherHandle {
    repo_id: RepoId,
    _inner: RecommendedWatcher,
}

impl WatcherHandle {
    pub fn repo_id(&self) -> &RepoId {
        &self.repo_id
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("repo_id", &self.repo_id)
            .finish()
    }
}

/// Watch `target.root` recursively and send grouped changes to `sink`.
pub fn spawn_watcher(target: WatchTarget, sink: mpsc::UnboundedSender<RoutedGroup>) -> Result<WatcherHandle> {
    let WatchTarget {
        repo_id,
        root,
        ignore,
        buffer,
    } = target;
    let root = root.canonicalize().unwrap_or(root);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            // Only fails once the async loop is gone.
            let _ = event_tx.send(res);
        },
        Config::default(),
    )
    .with_context(|| format!("creating watcher for repository '{repo_id}'"))?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {:?}", root))?;

    info!(repo = %repo_id, "file watcher started on {:?}", root);

    let loop_repo = repo_id.clone();
    tokio::spawn(async move {
        let repo_id = loop_repo;
        let mut buffer = EventBuffer::new(buffer);
        let mut seq = 0u64;

        loop {
            let deadline = buffer.next_deadline();
            tokio::select! {
                received = event_rx.recv() => match received {
                    Some(Ok(event)) => {
                        trace!(repo = %repo_id, ?event, "notify event");
                        for change in translate_event(&root, &ignore, event, &mut seq, Instant::now()) {
                            match buffer.feed(change) {
                                Ok(groups) => {
                                    if !forward(&repo_id, groups, &sink) {
                                        return;
                                    }
                                }
                                Err(err) => warn!(repo = %repo_id, error = %err, "change event rejected"),
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!(repo = %repo_id, error = %err, "file watch error; continuing");
                    }
                    None => {
                        forward(&repo_id, buffer.flush(), &sink);
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(|| Instant::now() + IDLE_WAKE)), if deadline.is_some() => {
                    if !forward(&repo_id, buffer.poll(Instant::now()), &sink) {
                        return;
                    }
                }
            }
        }
        debug!(repo = %repo_id, "watcher event loop finished");
    });

    Ok(WatcherHandle {
        repo_id,
        _inner: watcher,
    })
}

/// Returns `false` once nobody is listening any more.
fn forward(repo_id: &RepoId, groups: Vec<ChangeGroup>, sink: &mpsc::UnboundedSender<RoutedGroup>) -> bool {
    for group in groups {
        debug!(repo = %repo_id, operation = %group.operation, paths = ?group.paths, "change group ready");
        let routed = RoutedGroup {
            repo_id: repo_id.clone(),
            group,
        };
        if sink.send(routed).is_err() {
            debug!(repo = %repo_id, "change sink closed");
            return false;
        }
    }
    true
}

/// Map one notify event onto zero or more [`ChangeEvent`]s relative to `root`.
///
/// Access and metadata-only events are dropped, as are ignored paths.
pub fn translate_event(
    root: &Path,
    ignore: &IgnoreRules,
    event: Event,
    seq: &mut u64,
    at: Instant,
) -> Vec<ChangeEvent> {
    let relevant = |path: &Path| -> Option<PathBuf> {
        let rel = relative_path(root, path)?;
        (!ignore.is_ignored(&slash_str(&rel))).then_some(rel)
    };
    let mut next = |path: PathBuf, kind: ChangeKind| {
        *seq += 1;
        ChangeEvent::new(*seq, path, kind, at)
    };

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let from = relevant(&event.paths[0]);
            let to = relevant(&event.paths[1]);
            match (from, to) {
                (Some(from), Some(to)) => vec![next(to, ChangeKind::Moved { from })],
                (Some(from), None) => vec![next(from, ChangeKind::Deleted)],
                (None, Some(to)) => vec![next(to, ChangeKind::Created)],
                (None, None) => Vec::new(),
            }
        }
        kind => {
            let change: fn(&Path) -> ChangeKind = match kind {
                EventKind::Create(_) => |_: &Path| ChangeKind::Created,
                EventKind::Remove(_) => |_: &Path| ChangeKind::Deleted,
                EventKind::Modify(ModifyKind::Name(RenameMode::From)) => |_: &Path| ChangeKind::Deleted,
                EventKind::Modify(ModifyKind::Name(RenameMode::To)) => |_: &Path| ChangeKind::Created,
                EventKind::Modify(ModifyKind::Name(_)) => |p: &Path| {
                    if p.exists() {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Deleted
                    }
                },
                EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => return Vec::new(),
                EventKind::Modify(_) => |_: &Path| ChangeKind::Modified,
                EventKind::Any | EventKind::Other => return Vec::new(),
            };
            event
                .paths
                .iter()
                .filter_map(|p| relevant(p).map(|rel| next(rel, change(p))))
                .collect()
        }
    }
}
