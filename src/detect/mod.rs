//! Change detection: does a package differ from what is published?
//!
//! Primary signal: build the local artifact, download the published one,
//! extract both into scoped temp dirs, normalize the manifests (the
//! `version` field and internal-dependency specifiers legitimately differ
//! run to run), then compare the trees file by file.
//!
//! Failure policy, in order: a comparison that cannot complete falls back
//! to a coarse aggregate-size heuristic; if even that is impossible the
//! package is conservatively classified changed. Missing a real release is
//! worse than an occasional no-op publish. The whole detection phase runs
//! under a deadline; once it expires the remaining candidates are
//! classified changed without further I/O, and in-flight registry work is
//! bounded by the same deadline so a hung subprocess for one package
//! cannot stall or cancel its siblings.

use crate::core::error::{FlotillaError, FlotillaResult, RegistryError, ResultExt};
use crate::manifest::{DepCategory, MANIFEST_FILE, Package};
use crate::registry::RegistryGateway;
use rayon::prelude::*;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Tarball size delta considered noise (archive metadata, compression drift)
const SIZE_TOLERANCE_BYTES: u64 = 512;

/// Artifacts beyond this size are not content-compared
const MAX_ARTIFACT_BYTES: u64 = 256 * 1024 * 1024;

/// Why a package was classified changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
  NeverPublished,
  ContentDiff,
  SizeDelta,
  DetectFailed,
  DeadlineExpired,
  Forced,
}

impl ChangeReason {
  pub fn describe(&self) -> &'static str {
    match self {
      ChangeReason::NeverPublished => "never published",
      ChangeReason::ContentDiff => "content differs from published artifact",
      ChangeReason::SizeDelta => "artifact size differs from published artifact",
      ChangeReason::DetectFailed => "comparison failed, assuming changed",
      ChangeReason::DeadlineExpired => "detection deadline expired, assuming changed",
      ChangeReason::Forced => "forced",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
  Unchanged,
  Changed(ChangeReason),
}

pub struct ChangeDetector<'a> {
  registry: &'a dyn RegistryGateway,
  /// Names whose specifiers are excluded from manifest comparison
  internal_names: HashSet<String>,
}

impl<'a> ChangeDetector<'a> {
  pub fn new(registry: &'a dyn RegistryGateway, internal_names: HashSet<String>) -> Self {
    Self {
      registry,
      internal_names,
    }
  }

  /// Classify every package, in parallel, under one shared deadline.
  ///
  /// Per-package failures never abort the phase and never cancel siblings;
  /// they degrade to `Changed(DetectFailed)` with a warning.
  pub fn detect_all(&self, packages: &[Package], deadline: Instant) -> HashMap<String, Change> {
    packages
      .par_iter()
      .map(|pkg| {
        let change = if Instant::now() >= deadline {
          Change::Changed(ChangeReason::DeadlineExpired)
        } else {
          match self.has_changed(pkg, deadline) {
            Ok(change) => change,
            Err(err) => {
              eprintln!("⚠️  Change detection failed for '{}' ({}); assuming changed", pkg.name, err);
              Change::Changed(ChangeReason::DetectFailed)
            }
          }
        };
        (pkg.name.clone(), change)
      })
      .collect()
  }

  /// Compare one package against its published artifact, giving up on
  /// registry work at `deadline`.
  ///
  /// Both temp extraction dirs are scoped to this call and released on
  /// every path out of it.
  pub fn has_changed(&self, pkg: &Package, deadline: Instant) -> FlotillaResult<Change> {
    let Some(reference) = &pkg.registry_artifact else {
      return Ok(Change::Changed(ChangeReason::NeverPublished));
    };

    let local_dir = tempfile::TempDir::new().context("failed to create temp dir")?;
    let remote_dir = tempfile::TempDir::new().context("failed to create temp dir")?;

    let local_tar = self.registry.pack(&pkg.path, local_dir.path(), deadline)?;
    let remote_tar = self.registry.download_artifact(reference, remote_dir.path(), deadline)?;

    match self.compare_artifacts(&local_tar, &remote_tar, local_dir.path(), remote_dir.path()) {
      Ok(true) => Ok(Change::Unchanged),
      Ok(false) => Ok(Change::Changed(ChangeReason::ContentDiff)),
      Err(err) => {
        eprintln!(
          "⚠️  Content comparison failed for '{}' ({}); falling back to size check",
          pkg.name, err
        );
        size_heuristic(&local_tar, &remote_tar)
      }
    }
  }

  /// Extract both tarballs and compare the normalized trees
  fn compare_artifacts(
    &self,
    local_tar: &Path,
    remote_tar: &Path,
    local_dir: &Path,
    remote_dir: &Path,
  ) -> FlotillaResult<bool> {
    for tarball in [local_tar, remote_tar] {
      let size = std::fs::metadata(tarball)
        .with_context(|| format!("failed to stat {}", tarball.display()))?
        .len();
      if size > MAX_ARTIFACT_BYTES {
        return Err(
          RegistryError::ArtifactTooLarge {
            reference: tarball.display().to_string(),
            size,
            limit: MAX_ARTIFACT_BYTES,
          }
          .into(),
        );
      }
    }

    let local_root = extract_tarball(local_tar, &local_dir.join("tree"))?;
    let remote_root = extract_tarball(remote_tar, &remote_dir.join("tree"))?;

    compare_trees(&local_root, &remote_root, &self.internal_names)
  }
}

/// Recursive content comparison of two extracted artifact trees.
///
/// Manifests are compared structurally after normalization; every other
/// file by sha256 digest. File sets must match exactly.
pub(crate) fn compare_trees(
  local_root: &Path,
  remote_root: &Path,
  internal_names: &HashSet<String>,
) -> FlotillaResult<bool> {
  let local_manifest = normalized_manifest(local_root, internal_names)?;
  let remote_manifest = normalized_manifest(remote_root, internal_names)?;
  if local_manifest != remote_manifest {
    return Ok(false);
  }

  let local_digests = tree_digests(local_root)?;
  let remote_digests = tree_digests(remote_root)?;
  Ok(local_digests == remote_digests)
}

/// Parse and normalize one tree's manifest: drop the version field and every
/// internal-dependency specifier entry.
fn normalized_manifest(root: &Path, internal_names: &HashSet<String>) -> FlotillaResult<Value> {
  let path = root.join(MANIFEST_FILE);
  let content =
    std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
  let mut manifest: Value =
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;

  normalize_manifest(&mut manifest, internal_names);
  Ok(manifest)
}

pub(crate) fn normalize_manifest(manifest: &mut Value, internal_names: &HashSet<String>) {
  let Some(map) = manifest.as_object_mut() else {
    return;
  };

  map.remove("version");

  for category in DepCategory::ALL {
    if let Some(Value::Object(deps)) = map.get_mut(category.manifest_key()) {
      deps.retain(|name, _| !internal_names.contains(name));
    }
  }
}

/// sha256 digest per file, keyed by path relative to `root`; the manifest
/// is excluded (compared structurally instead)
fn tree_digests(root: &Path) -> FlotillaResult<BTreeMap<PathBuf, [u8; 32]>> {
  let mut digests = BTreeMap::new();
  let mut stack = vec![root.to_path_buf()];

  while let Some(dir) = stack.pop() {
    let entries =
      std::fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))?;

    for entry in entries {
      let entry = entry.context("failed to read directory entry")?;
      let path = entry.path();

      if path.is_dir() {
        stack.push(path);
        continue;
      }

      let rel = path
        .strip_prefix(root)
        .map_err(|_| FlotillaError::message(format!("path {} escapes artifact root", path.display())))?
        .to_path_buf();

      if rel == Path::new(MANIFEST_FILE) {
        continue;
      }

      let bytes = std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
      let mut hasher = Sha256::new();
      hasher.update(&bytes);
      digests.insert(rel, hasher.finalize().into());
    }
  }

  Ok(digests)
}

/// Extract a gzipped tarball with system tar; registry artifacts root their
/// contents under `package/`.
fn extract_tarball(tarball: &Path, dest: &Path) -> FlotillaResult<PathBuf> {
  std::fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;

  let output = Command::new("tar")
    .arg("-xzf")
    .arg(tarball)
    .arg("-C")
    .arg(dest)
    .output()
    .context("failed to execute tar")?;

  if !output.status.success() {
    return Err(FlotillaError::message(format!(
      "tar extraction of {} failed: {}",
      tarball.display(),
      String::from_utf8_lossy(&output.stderr).trim()
    )));
  }

  let package_root = dest.join("package");
  Ok(if package_root.is_dir() { package_root } else { dest.to_path_buf() })
}

/// Coarse fallback: aggregate tarball byte sizes within a small tolerance
fn size_heuristic(local_tar: &Path, remote_tar: &Path) -> FlotillaResult<Change> {
  let local = std::fs::metadata(local_tar).context("failed to stat local artifact")?.len();
  let remote = std::fs::metadata(remote_tar)
    .context("failed to stat published artifact")?
    .len();

  if local.abs_diff(remote) > SIZE_TOLERANCE_BYTES {
    Ok(Change::Changed(ChangeReason::SizeDelta))
  } else {
    Ok(Change::Unchanged)
  }
}
