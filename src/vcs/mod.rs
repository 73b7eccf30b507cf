//! Source-control gateway
//!
//! Two operations are all the publish flow needs: the current branch (to
//! pick a release line) and the changed paths in a commit range (for the
//! standalone `affected` analysis). System git implements both.

pub mod system_git;

pub use system_git::SystemGit;

use crate::core::error::FlotillaResult;
use std::path::PathBuf;

pub trait SourceControlGateway: Send + Sync {
  fn current_branch(&self) -> FlotillaResult<String>;

  /// Paths changed in a git range (e.g. `origin/main...HEAD`), absolute
  fn diff_changed_paths(&self, range: &str) -> FlotillaResult<Vec<PathBuf>>;
}
