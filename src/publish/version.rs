//! Next-version policy: pure, no I/O
//!
//! Two release lines. The main line takes a standard major/minor/patch
//! increment. The dev line produces `-dev.N` pre-releases: an existing
//! `-dev.N` suffix increments N, anything else bumps the patch component
//! and starts at `-dev.0`. Any other branch is not publishable.

use crate::core::error::{FlotillaError, FlotillaResult};
use semver::{Prerelease, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpLevel {
  Major,
  Minor,
  Patch,
}

impl BumpLevel {
  pub fn parse(s: &str) -> Option<Self> {
    match s.to_lowercase().as_str() {
      "major" => Some(BumpLevel::Major),
      "minor" => Some(BumpLevel::Minor),
      "patch" => Some(BumpLevel::Patch),
      _ => None,
    }
  }
}

/// Which release line the current branch maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchContext {
  Main,
  Dev,
  Other(String),
}

impl BranchContext {
  pub fn resolve(branch: &str, main_branch: &str, dev_branch: &str) -> Self {
    if branch == main_branch {
      BranchContext::Main
    } else if branch == dev_branch {
      BranchContext::Dev
    } else {
      BranchContext::Other(branch.to_string())
    }
  }
}

const DEV_PREFIX: &str = "dev.";

/// Compute the next version for one package.
pub fn calc_update_version(
  current: &Version,
  bump: BumpLevel,
  branch: &BranchContext,
) -> FlotillaResult<Version> {
  match branch {
    BranchContext::Main => Ok(apply_bump(current, bump)),
    BranchContext::Dev => Ok(next_dev_version(current)),
    BranchContext::Other(name) => Err(FlotillaError::NotPublishableBranch { branch: name.clone() }),
  }
}

fn apply_bump(current: &Version, bump: BumpLevel) -> Version {
  match bump {
    BumpLevel::Major => Version::new(current.major + 1, 0, 0),
    BumpLevel::Minor => Version::new(current.major, current.minor + 1, 0),
    BumpLevel::Patch => Version::new(current.major, current.minor, current.patch + 1),
  }
}

fn next_dev_version(current: &Version) -> Version {
  if let Some(n) = current
    .pre
    .as_str()
    .strip_prefix(DEV_PREFIX)
    .and_then(|n| n.parse::<u64>().ok())
  {
    return dev_version(current.major, current.minor, current.patch, n + 1);
  }

  dev_version(current.major, current.minor, current.patch + 1, 0)
}

fn dev_version(major: u64, minor: u64, patch: u64, n: u64) -> Version {
  let mut version = Version::new(major, minor, patch);
  version.pre = Prerelease::new(&format!("{}{}", DEV_PREFIX, n)).expect("dev.N is a valid pre-release");
  version
}
