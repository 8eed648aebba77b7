// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Path, PathBuf};

/// Convert a path into one relative to `root`.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (symlinks, `/private/var/...` on macOS), we canonicalize
///   both paths and try again. A deleted path cannot be canonicalized, so we
///   then canonicalize its parent instead.
///
/// Returns `None` for `root` itself and for paths outside it.
pub fn relative_path(root: &Path, path: &Path) -> Option<PathBuf> {
    if let Ok(rel) = path.strip_prefix(root) {
        return non_empty(rel);
    }

    let root_canon = root.canonicalize().ok()?;
    if let Ok(path_canon) = path.canonicalize() {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return non_empty(rel);
        }
    }

    let parent = path.parent()?.canonicalize().ok()?;
    let rel_parent = parent.strip_prefix(&root_canon).ok()?;
    non_empty(&rel_parent.join(path.file_name()?))
}

/// Forward-slash form used for glob matching.
pub fn slash_str(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

fn non_empty(rel: &Path) -> Option<PathBuf> {
    (!rel.as_os_str().is_empty()).then(|| rel.to_path_buf())
}
