// src/watch/grouping.rs

//! Turning a window of raw events into [`ChangeGroup`]s.
//!
//! Every event fed into a [`GroupBuilder`] is attributed to exactly one draft
//! group, and drafts are only ever merged, never discarded. That is what
//! guarantees the buffer's no-loss property.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::time::Instant;

use crate::types::{ChangeEvent, ChangeGroup, ChangeKind, OperationKind};

/// File-name patterns that identify editor temp/backup files.
pub const DEFAULT_TEMP_PATTERNS: &[&str] = &[
    r"\.tmp$",
    r"~$",
    r"^\..*\.tmp\.\w+$",
    r"^\..*\.sw[a-p]$",
    r"^\.#",
    r"^#.*#$",
];

/// Compiled temp-file patterns, matched against the file name only.
#[derive(Debug, Clone)]
pub struct TempFilePatterns {
    patterns: Vec<Regex>,
}

impl TempFilePatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_temp(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.patterns.iter().any(|re| re.is_match(name))
    }
}

impl Default for TempFilePatterns {
    fn default() -> Self {
        let patterns = DEFAULT_TEMP_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self { patterns }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastKind {
    Present,
    Deleted,
}

#[derive(Debug)]
struct Draft {
    key: PathBuf,
    related: BTreeSet<PathBuf>,
    event_count: usize,
    last: LastKind,
    atomic: bool,
    last_at: Instant,
}

impl Draft {
    fn new(key: PathBuf, at: Instant) -> Self {
        Self {
            key,
            related: BTreeSet::new(),
            event_count: 0,
            last: LastKind::Present,
            atomic: false,
            last_at: at,
        }
    }

    fn into_group(self) -> ChangeGroup {
        let (operation, confidence) = if self.atomic {
            (OperationKind::AtomicRewrite, 0.95)
        } else if self.last == LastKind::Deleted {
            (OperationKind::Delete, 1.0)
        } else {
            (OperationKind::SimpleEdit, 1.0)
        };
        ChangeGroup {
            paths: BTreeSet::from([self.key]),
            related: self.related,
            operation,
            confidence,
            event_count: self.event_count,
            at: self.last_at,
        }
    }
}

/// Accumulates one window worth of events into draft groups.
#[derive(Debug)]
pub struct GroupBuilder {
    drafts: Vec<Option<Draft>>,
    route: HashMap<PathBuf, usize>,
    temp_aware: bool,
}

impl GroupBuilder {
    /// `temp_aware` enables atomic-rewrite detection (smart mode).
    pub fn new(temp_aware: bool) -> Self {
        Self {
            drafts: Vec::new(),
            route: HashMap::new(),
            temp_aware,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.route.is_empty() && self.drafts.iter().all(Option::is_none)
    }

    pub fn has_atomic(&self) -> bool {
        self.drafts.iter().flatten().any(|d| d.atomic)
    }

    pub fn push(&mut self, event: ChangeEvent, temp: &TempFilePatterns) {
        let ChangeEvent { path, kind, at, .. } = event;
        match kind {
            ChangeKind::Created | ChangeKind::Modified => {
                let idx = self.draft_for(&path, at);
                self.touch(idx, LastKind::Present, at);
            }
            ChangeKind::Deleted => {
                let idx = self.draft_for(&path, at);
                self.touch(idx, LastKind::Deleted, at);
            }
            ChangeKind::Moved { from } => {
                if self.temp_aware && temp.is_temp(&path) && !temp.is_temp(&from) {
                    // Original renamed to a backup name: the group stays keyed
                    // on the original and the backup is routed into it.
                    let idx = self.draft_for(&from, at);
                    self.route.insert(path.clone(), idx);
                    if let Some(d) = self.drafts[idx].as_mut() {
                        d.related.insert(path);
                        d.atomic = true;
                    }
                    self.touch(idx, LastKind::Present, at);
                    return;
                }

                let atomic = self.temp_aware && temp.is_temp(&from) && !temp.is_temp(&path);
                let idx = self.absorb_move(&from, &path, at);
                if let Some(d) = self.drafts[idx].as_mut() {
                    d.related.insert(from);
                    d.atomic |= atomic;
                }
                self.touch(idx, LastKind::Present, at);
            }
        }
    }

    /// Drain all drafts into groups, merging plain edits into one batch group
    /// when at least `batch_threshold` distinct paths changed.
    pub fn finish(&mut self, batch_threshold: Option<usize>) -> Vec<ChangeGroup> {
        self.route.clear();
        let drafts: Vec<Draft> = self.drafts.drain(..).flatten().collect();

        let plain_count = drafts.iter().filter(|d| !d.atomic).count();
        match batch_threshold {
            Some(threshold) if threshold > 0 && plain_count >= threshold => {
                let (atomic, plain): (Vec<Draft>, Vec<Draft>) =
                    drafts.into_iter().partition(|d| d.atomic);
                let mut groups: Vec<ChangeGroup> =
                    atomic.into_iter().map(Draft::into_group).collect();
                groups.push(batch_group(plain));
                groups
            }
            _ => drafts.into_iter().map(Draft::into_group).collect(),
        }
    }

    fn draft_for(&mut self, path: &Path, at: Instant) -> usize {
        if let Some(&idx) = self.route.get(path) {
            return idx;
        }
        let idx = self.drafts.len();
        self.drafts.push(Some(Draft::new(path.to_path_buf(), at)));
        self.route.insert(path.to_path_buf(), idx);
        idx
    }

    fn touch(&mut self, idx: usize, last: LastKind, at: Instant) {
        if let Some(d) = self.drafts[idx].as_mut() {
            d.event_count += 1;
            d.last = last;
            d.last_at = at;
        }
    }

    fn absorb_move(&mut self, from: &Path, to: &Path, at: Instant) -> usize {
        let from_idx = self.route.remove(from);
        match (self.route.get(to).copied(), from_idx) {
            (Some(target), Some(source)) if target != source => {
                self.merge(source, target);
                target
            }
            (Some(target), _) => target,
            (None, Some(source)) => {
                if let Some(d) = self.drafts[source].as_mut() {
                    let old_key = std::mem::replace(&mut d.key, to.to_path_buf());
                    d.related.insert(old_key);
                }
                self.route.insert(to.to_path_buf(), source);
                source
            }
            (None, None) => self.draft_for(to, at),
        }
    }

    fn merge(&mut self, source: usize, target: usize) {
        let Some(src) = self.drafts[source].take() else {
            return;
        };
        if let Some(dst) = self.drafts[target].as_mut() {
            dst.related.insert(src.key);
            dst.related.extend(src.related);
            dst.event_count += src.event_count;
            dst.atomic |= src.atomic;
            dst.last_at = dst.last_at.max(src.last_at);
        }
        for idx in self.route.values_mut() {
            if *idx == source {
                *idx = target;
            }
        }
    }
}

fn batch_group(drafts: Vec<Draft>) -> ChangeGroup {
    let mut paths = BTreeSet::new();
    let mut related = BTreeSet::new();
    let mut event_count = 0;
    let mut at: Option<Instant> = None;

    for d in drafts {
        paths.insert(d.key);
        related.extend(d.related);
        event_count += d.event_count;
        at = Some(at.map_or(d.last_at, |a| a.max(d.last_at)));
    }
    // A path can be primary in one draft and absorbed in another.
    let related = related.difference(&paths).cloned().collect();

    ChangeGroup {
        paths,
        related,
        operation: OperationKind::Batch,
        confidence: 0.8,
        event_count,
        at: at.unwrap_or_else(Instant::now),
    }
}

/// One trivial group per event, used when grouping is off.
pub fn single_event_group(event: ChangeEvent) -> ChangeGroup {
    let operation = match event.kind {
        ChangeKind::Deleted => OperationKind::Delete,
        _ => OperationKind::SimpleEdit,
    };
    let related = match event.kind {
        ChangeKind::Moved { from } => BTreeSet::from([from]),
        _ => BTreeSet::new(),
    };
    ChangeGroup {
        paths: BTreeSet::from([event.path]),
        related,
        operation,
        confidence: 1.0,
        event_count: 1,
        at: event.at,
    }
}
