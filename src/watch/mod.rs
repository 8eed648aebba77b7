// src/watch/mod.rs

//! File watching and change grouping.
//!
//! This module is responsible for:
//! - Wiring up a cross-platform filesystem watcher (`notify`) per repository.
//! - Dropping ignored paths (`[global].ignore`).
//! - Buffering raw events and grouping them into logical saves.
//!
//! It knows nothing about rules or VCS; it only turns filesystem changes
//! into [`ChangeGroup`](crate::types::ChangeGroup)s tagged with a repository.

pub mod buffer;
pub mod grouping;
pub mod ignore;
pub mod path_utils;
pub mod watcher;

use anyhow::{Context, Result};

use crate::config::{GlobalSettings, RepositoryConfig};

pub use buffer::{BufferSettings, EventBuffer, GroupingError};
pub use grouping::TempFilePatterns;
pub use ignore::IgnoreRules;
pub use watcher::{spawn_watcher, translate_event, RoutedGroup, WatchTarget, WatcherHandle};

impl BufferSettings {
    pub fn from_global(global: &GlobalSettings) -> Result<Self> {
        let temp_patterns = TempFilePatterns::new(&global.temp_patterns)
            .context("compiling [global].temp_patterns")?;
        Ok(Self {
            mode: global.grouping_mode,
            window: global.buffer_window,
            settle: global.settle_delay,
            batch_threshold: global.batch_threshold,
            temp_patterns,
        })
    }
}

/// Build the watch target for one repository.
pub fn watch_target(repo: &RepositoryConfig, global: &GlobalSettings) -> Result<WatchTarget> {
    Ok(WatchTarget {
        repo_id: repo.id.clone(),
        root: repo.path.clone(),
        ignore: IgnoreRules::new(&global.ignore)?,
        buffer: BufferSettings::from_global(global)?,
    })
}
