// src/vcs/git.rs

//! [`Engine`] implementation that shells out to the `git` binary.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::{CommitId, Engine, EngineError, FileChange, FileStatus, WorkingTreeStatus};

/// Unmerged XY codes from `git status --porcelain`.
const CONFLICT_CODES: &[&str] = &["DD", "AU", "UD", "UA", "DU", "AA", "UU"];

#[derive(Debug, Clone)]
pub struct GitCliEngine {
    root: PathBuf,
    program: String,
}

impl GitCliEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            program: "git".to_string(),
        }
    }

    /// Use a specific git executable instead of `git` on `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output, EngineError> {
        debug!(root = ?self.root, ?args, "running git");
        Command::new(&self.program)
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    fn git(&self, op: &'static str, args: &[&str]) -> Result<String, EngineError> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(EngineError::Command {
                op,
                detail: failure_detail(&output),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn current_branch(&self) -> Result<Option<String>, EngineError> {
        // Works on an unborn branch too; exits non-zero on a detached HEAD.
        let output = self.run(&["symbolic-ref", "--short", "-q", "HEAD"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!branch.is_empty()).then_some(branch))
    }
}

impl Engine for GitCliEngine {
    fn name(&self) -> &'static str {
        "git"
    }

    fn status(&self) -> Result<WorkingTreeStatus, EngineError> {
        let raw = self.git(
            "git status",
            &["status", "--porcelain=v1", "-z", "--untracked-files=all"],
        )?;
        let mut status = parse_porcelain(&raw);
        status.branch = self.current_branch()?;
        Ok(status)
    }

    fn stage_all(&self) -> Result<(), EngineError> {
        self.git("git add", &["add", "--all"]).map(|_| ())
    }

    fn commit(&self, message: &str) -> Result<CommitId, EngineError> {
        let output = self.run(&["commit", "-m", message])?;
        if !output.status.success() {
            let detail = failure_detail(&output);
            if detail.contains("unmerged") || detail.contains("conflict") {
                return Err(EngineError::Conflict(detail));
            }
            return Err(EngineError::Command {
                op: "git commit",
                detail,
            });
        }
        let head = self.git("git rev-parse", &["rev-parse", "HEAD"])?;
        Ok(CommitId(head.trim().to_string()))
    }

    fn push(&self, remote: &str, branch: &str) -> Result<(), EngineError> {
        let output = self.run(&["push", remote, branch])?;
        if output.status.success() {
            return Ok(());
        }
        let detail = failure_detail(&output);
        if is_network_failure(&detail) {
            Err(EngineError::PushUnavailable {
                remote: remote.to_string(),
                detail,
            })
        } else {
            Err(EngineError::PushRejected {
                remote: remote.to_string(),
                detail,
            })
        }
    }
}

/// Parse `git status --porcelain=v1 -z` output. The branch is left unset.
pub fn parse_porcelain(raw: &str) -> WorkingTreeStatus {
    let mut status = WorkingTreeStatus::default();
    let mut entries = raw.split('\0').filter(|e| !e.is_empty());

    while let Some(entry) = entries.next() {
        if entry.len() < 4 || !entry.is_char_boundary(2) {
            continue;
        }
        let (code, rest) = entry.split_at(2);
        let path = PathBuf::from(&rest[1..]);

        if CONFLICT_CODES.contains(&code) {
            status.conflicted.push(path);
            continue;
        }

        let mut chars = code.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');

        let file_status = match (x, y) {
            ('?', '?') => FileStatus::Added,
            ('!', '!') => continue,
            ('R', _) => {
                let from = entries.next().map(PathBuf::from).unwrap_or_default();
                FileStatus::Renamed { from }
            }
            ('C', _) => {
                // The copy source is not part of this change.
                entries.next();
                FileStatus::Added
            }
            _ => {
                let c = if x != ' ' { x } else { y };
                match c {
                    'A' => FileStatus::Added,
                    'D' => FileStatus::Deleted,
                    'T' => FileStatus::TypeChanged,
                    _ => FileStatus::Modified,
                }
            }
        };
        status.changes.push(FileChange {
            path,
            status: file_status,
        });
    }

    status
}

fn failure_detail(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stdout
    }
}

fn is_network_failure(detail: &str) -> bool {
    const MARKERS: &[&str] = &[
        "Could not resolve host",
        "Connection refused",
        "Connection timed out",
        "Operation timed out",
        "unable to access",
        "Could not read from remote repository",
        "early EOF",
    ];
    MARKERS.iter().any(|m| detail.contains(m))
}
