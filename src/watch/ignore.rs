// src/watch/ignore.rs

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled `[global].ignore` globs, matched against repository-relative
/// paths with forward slashes (e.g. `".git/index"`).
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    set: GlobSet,
}

impl IgnoreRules {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pat in patterns {
            let glob = Glob::new(pat).with_context(|| format!("invalid ignore pattern: {pat}"))?;
            builder.add(glob);
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
        }
    }

    /// A path is ignored if it or any of its parent directories match.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        if self.set.is_match(rel_path) {
            return true;
        }
        rel_path
            .match_indices('/')
            .any(|(idx, _)| self.set.is_match(&rel_path[..idx]))
    }
}
