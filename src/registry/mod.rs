//! Registry gateway: the one seam between flotilla and the package registry
//!
//! The transport is deliberately behind a trait so the orchestrator and
//! change detector can be exercised against in-memory fakes. The shipped
//! implementation shells out to system npm (`system_npm`).

pub mod system_npm;

pub use system_npm::SystemNpm;

use crate::core::error::FlotillaResult;
use crate::manifest::AccessLevel;
use semver::Version;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Latest published state of a package, as the registry knows it
#[derive(Debug, Clone)]
pub struct PackageInfo {
  /// `0.0.0` for a package the registry has never seen
  pub version: Version,
  /// Downloadable reference to the published artifact (tarball URL)
  pub artifact: Option<String>,
}

impl PackageInfo {
  /// State for a package that has never been published
  pub fn unpublished() -> Self {
    Self {
      version: Version::new(0, 0, 0),
      artifact: None,
    }
  }
}

/// Registry operations needed by loading, change detection, and publishing
pub trait RegistryGateway: Send + Sync {
  /// Latest published version and artifact reference; absent package is not
  /// an error and yields `PackageInfo::unpublished()`.
  fn fetch_package_info(&self, name: &str) -> FlotillaResult<PackageInfo>;

  /// Download a published artifact into `dest_dir`, returning the tarball
  /// path. The operation must give up by `deadline`.
  fn download_artifact(&self, reference: &str, dest_dir: &Path, deadline: Instant) -> FlotillaResult<PathBuf>;

  /// Build the local publishable artifact for a package directory,
  /// returning the tarball path. The operation must give up by `deadline`.
  fn pack(&self, package_dir: &Path, dest_dir: &Path, deadline: Instant) -> FlotillaResult<PathBuf>;

  /// Publish a package directory under a distribution tag
  fn publish(&self, package_dir: &Path, tag: &str, access: AccessLevel) -> FlotillaResult<()>;
}
