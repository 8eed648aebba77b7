// src/pipeline/summary.rs

use std::fmt::Write;

use crate::vcs::{FileChange, FileStatus};

/// Files listed per section before collapsing into "... (N more)".
pub const MAX_SUMMARY_FILES: usize = 10;

/// Human-readable change summary grouped by status, for commit messages.
pub fn change_summary(changes: &[FileChange]) -> String {
    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut deleted = Vec::new();
    let mut renamed = Vec::new();
    let mut type_changed = Vec::new();

    for change in changes {
        let path = change.path.display();
        match &change.status {
            FileStatus::Added => added.push(format!("A {path}")),
            FileStatus::Modified => modified.push(format!("M {path}")),
            FileStatus::Deleted => deleted.push(format!("D {path}")),
            FileStatus::Renamed { from } => renamed.push(format!("R {} -> {path}", from.display())),
            FileStatus::TypeChanged => type_changed.push(format!("T {path}")),
        }
    }

    let mut out = String::new();
    for (title, lines) in [
        ("Added", &added),
        ("Modified", &modified),
        ("Deleted", &deleted),
        ("Renamed", &renamed),
        ("Type Changed", &type_changed),
    ] {
        if lines.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "{title} ({}):", lines.len());
        for line in lines.iter().take(MAX_SUMMARY_FILES) {
            let _ = writeln!(out, "  {line}");
        }
        if lines.len() > MAX_SUMMARY_FILES {
            let _ = writeln!(out, "  ... ({} more)", lines.len() - MAX_SUMMARY_FILES);
        }
    }

    out.trim_end().to_string()
}
