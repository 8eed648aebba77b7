// tests/common/mod.rs

#![allow(dead_code)]

use std::error::Error;
use std::path::Path;
use std::process::Command;

pub use savepoint_test_utils::init_tracing;

pub type TestResult = Result<(), Box<dyn Error>>;

/// Whether a usable `git` binary is on `PATH`.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git in `dir`, failing the test on a non-zero exit. Returns stdout.
pub fn git(dir: &Path, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let output = Command::new("git").args(args).current_dir(dir).output()?;
    if !output.status.success() {
        return Err(format!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        )
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `git init` on branch `main` with a committer identity and one commit.
pub fn init_repo(dir: &Path) -> TestResult {
    git(dir, &["init", "-q"])?;
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
    git(dir, &["config", "user.name", "Savepoint Tests"])?;
    git(dir, &["config", "user.email", "tests@savepoint.invalid"])?;
    git(dir, &["config", "commit.gpgsign", "false"])?;
    std::fs::write(dir.join("README.md"), "# test\n")?;
    git(dir, &["add", "README.md"])?;
    git(dir, &["commit", "-q", "-m", "initial"])?;
    Ok(())
}
