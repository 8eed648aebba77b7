// src/orchestrator/guard.rs

use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

/// Circuit breaker for mass changes (checkouts, generated files, refactors).
#[derive(Debug, Clone)]
pub struct BulkChangeGuard {
    threshold: usize,
    window: Duration,
    recent: VecDeque<(Instant, PathBuf)>,
}

impl BulkChangeGuard {
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            threshold,
            window,
            recent: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record changed paths; returns the distinct path count when it reaches
    /// the threshold.
    pub fn record<'a>(&mut self, paths: impl IntoIterator<Item = &'a PathBuf>, now: Instant) -> Option<usize> {
        if self.threshold == 0 {
            return None;
        }

        while let Some((at, _)) = self.recent.front() {
            if now.duration_since(*at) > self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.extend(paths.into_iter().map(|p| (now, p.clone())));

        let distinct: BTreeSet<&PathBuf> = self.recent.iter().map(|(_, p)| p).collect();
        (distinct.len() >= self.threshold).then_some(distinct.len())
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}
