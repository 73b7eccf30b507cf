//! System git backend - zero dependencies
//!
//! Uses git plumbing commands with an isolated subprocess environment
//! (cleared env, whitelisted PATH/HOME, safe config overrides) so ambient
//! git configuration cannot change behavior.

use crate::core::error::{FlotillaError, FlotillaResult, ResultExt};
use crate::vcs::SourceControlGateway;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct SystemGit {
  repo_path: PathBuf,
  work_tree: PathBuf,
}

impl SystemGit {
  /// Open a git repository. One subprocess call for the metadata.
  pub fn open(path: &Path) -> FlotillaResult<Self> {
    let output = Command::new("git")
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .context("failed to execute git rev-parse")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(FlotillaError::message(format!(
        "failed to open git repository at {}: {}",
        path.display(),
        stderr.trim()
      )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);

    Ok(Self {
      repo_path: path.to_path_buf(),
      work_tree: PathBuf::from(stdout.trim()),
    })
  }

  /// Create a safe git command with isolated environment
  fn git_cmd(&self) -> Command {
    let mut cmd = Command::new("git");

    cmd.arg("-C").arg(&self.repo_path);

    // Isolated environment (don't trust global config)
    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
      cmd.env("PATH", path);
    }
    if let Ok(home) = std::env::var("HOME") {
      cmd.env("HOME", home);
    }

    cmd.arg("-c").arg("advice.detachedHead=false");
    cmd.arg("-c").arg("core.quotePath=false");

    cmd
  }
}

impl SourceControlGateway for SystemGit {
  fn current_branch(&self) -> FlotillaResult<String> {
    let output = self
      .git_cmd()
      .args(["rev-parse", "--abbrev-ref", "HEAD"])
      .output()
      .context("failed to get current branch")?;

    if !output.status.success() {
      // Detached HEAD
      return Ok("HEAD".to_string());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  fn diff_changed_paths(&self, range: &str) -> FlotillaResult<Vec<PathBuf>> {
    let output = self
      .git_cmd()
      .args(["diff", "--name-only", range])
      .output()
      .context("failed to run git diff")?;

    if !output.status.success() {
      return Err(FlotillaError::message(format!(
        "git diff --name-only {} failed: {}",
        range,
        String::from_utf8_lossy(&output.stderr).trim()
      )));
    }

    Ok(
      String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| self.work_tree.join(l.trim()))
        .collect(),
    )
  }
}
