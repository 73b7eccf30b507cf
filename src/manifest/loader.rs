//! Manifest loading and internal/external dependency classification
//!
//! Loading is two-pass: the first pass reads every manifest just for its
//! name, so the second pass can classify each dependency as internal
//! (same-repo target) or external. Classification and specifier validation
//! both go through `Specifier::parse`; any invalid specifier rejects the
//! whole load before build or publish work starts.

use crate::core::config::FlotillaConfig;
use crate::core::error::{FlotillaError, FlotillaResult, ManifestError, ResultExt};
use crate::manifest::{AccessLevel, DepCategory, DepKind, Dependency, MANIFEST_FILE, Package, Specifier};
use crate::registry::RegistryGateway;
use rayon::prelude::*;
use semver::Version;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Load, validate, and classify every package in `dirs`.
///
/// The registry gateway fills in each package's last published version and
/// artifact reference (absent package ⇒ `0.0.0`, no artifact). A registry
/// failure here degrades to "never published" with a warning instead of
/// aborting: the conservative direction for change detection is to treat
/// the package as changed, never to skip it.
pub fn load_packages(
  dirs: &[PathBuf],
  run_access: AccessLevel,
  registry: &dyn RegistryGateway,
) -> FlotillaResult<Vec<Package>> {
  // Pass 1: names only, to build the internal-name set
  let mut manifests = Vec::with_capacity(dirs.len());
  for dir in dirs {
    let manifest = read_manifest(dir)?;
    let name = manifest_name(dir, &manifest)?;
    manifests.push((dir.clone(), name, manifest));
  }

  let internal_names: HashSet<String> = manifests.iter().map(|(_, name, _)| name.clone()).collect();

  // Pass 2: full packages, registry lookups in parallel
  manifests
    .into_par_iter()
    .map(|(dir, name, manifest)| build_package(dir, name, manifest, run_access, &internal_names, registry))
    .collect()
}

fn build_package(
  dir: PathBuf,
  name: String,
  manifest: Map<String, Value>,
  run_access: AccessLevel,
  internal_names: &HashSet<String>,
  registry: &dyn RegistryGateway,
) -> FlotillaResult<Package> {
  let access = effective_access(&manifest, run_access);
  if access != run_access {
    return Err(
      ManifestError::AccessMismatch {
        package: name,
        expected: run_access.to_string(),
        found: access.to_string(),
      }
      .into(),
    );
  }

  let publish_eligible = !manifest
    .get("private")
    .and_then(Value::as_bool)
    .unwrap_or(false);

  let dependencies = classify_dependencies(&name, &manifest, internal_names)?;

  let info = match registry.fetch_package_info(&name) {
    Ok(info) => info,
    Err(err) => {
      eprintln!(
        "⚠️  Could not fetch registry info for '{}' ({}); treating as never published",
        name, err
      );
      crate::registry::PackageInfo::unpublished()
    }
  };

  Ok(Package {
    name,
    path: dir,
    current_version: info.version,
    registry_artifact: info.artifact,
    access,
    publish_eligible,
    dependencies,
    manifest,
  })
}

/// Parse and validate every dependency section of one manifest
fn classify_dependencies(
  package: &str,
  manifest: &Map<String, Value>,
  internal_names: &HashSet<String>,
) -> FlotillaResult<Vec<Dependency>> {
  let mut deps = Vec::new();

  for category in DepCategory::ALL {
    let Some(Value::Object(entries)) = manifest.get(category.manifest_key()) else {
      continue;
    };

    for (dep_name, raw) in entries {
      let raw = raw.as_str().ok_or_else(|| {
        FlotillaError::Manifest(ManifestError::InvalidSpecifier {
          package: package.to_string(),
          dependency: dep_name.clone(),
          specifier: raw.to_string(),
          reason: "specifier must be a string".to_string(),
        })
      })?;

      let specifier = Specifier::parse(raw).map_err(|reason| {
        FlotillaError::Manifest(ManifestError::InvalidSpecifier {
          package: package.to_string(),
          dependency: dep_name.clone(),
          specifier: raw.to_string(),
          reason,
        })
      })?;

      // A workspace marker always means internal, even if the target is
      // outside the loaded set (it then fails resolution later with a
      // precise error instead of silently going external).
      let kind = if specifier.is_workspace() || internal_names.contains(dep_name) {
        DepKind::Internal
      } else {
        DepKind::External
      };

      deps.push(Dependency {
        name: dep_name.clone(),
        kind,
        specifier,
        category,
      });
    }
  }

  Ok(deps)
}

fn effective_access(manifest: &Map<String, Value>, run_access: AccessLevel) -> AccessLevel {
  manifest
    .get("publishConfig")
    .and_then(|pc| pc.get("access"))
    .and_then(Value::as_str)
    .and_then(AccessLevel::parse)
    .unwrap_or(run_access)
}

fn read_manifest(dir: &Path) -> FlotillaResult<Map<String, Value>> {
  let path = dir.join(MANIFEST_FILE);
  if !path.exists() {
    return Err(ManifestError::NotFound { path }.into());
  }

  let content = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;

  match serde_json::from_str::<Value>(&content) {
    Ok(Value::Object(map)) => Ok(map),
    Ok(_) => Err(
      ManifestError::Parse {
        path,
        reason: "manifest root must be an object".to_string(),
      }
      .into(),
    ),
    Err(e) => Err(
      ManifestError::Parse {
        path,
        reason: e.to_string(),
      }
      .into(),
    ),
  }
}

fn manifest_name(dir: &Path, manifest: &Map<String, Value>) -> FlotillaResult<String> {
  manifest
    .get("name")
    .and_then(Value::as_str)
    .filter(|n| !n.is_empty())
    .map(str::to_string)
    .ok_or_else(|| {
      ManifestError::MissingName {
        path: dir.join(MANIFEST_FILE),
      }
      .into()
    })
}

/// Resolve the set of package directories for a run.
///
/// Sources, in order: explicit `packages` entries in flotilla.toml, the root
/// manifest's `workspaces` array, or the root itself. Entries ending in
/// `/*` expand to every subdirectory holding a manifest.
pub fn discover_package_dirs(root: &Path, config: &FlotillaConfig) -> FlotillaResult<Vec<PathBuf>> {
  let entries: Vec<String> = if !config.packages.is_empty() {
    config.packages.clone()
  } else {
    workspaces_from_root_manifest(root)?
  };

  if entries.is_empty() {
    // Single-package tree: the root is the package
    if root.join(MANIFEST_FILE).exists() {
      return Ok(vec![root.to_path_buf()]);
    }
    return Err(FlotillaError::with_help(
      format!("no packages found under {}", root.display()),
      "List package directories in flotilla.toml under `packages`, or add a root package.json",
    ));
  }

  let mut dirs = Vec::new();
  for entry in &entries {
    if let Some(parent) = entry.strip_suffix("/*") {
      let parent_dir = root.join(parent);
      let listing = std::fs::read_dir(&parent_dir)
        .with_context(|| format!("failed to list package directory {}", parent_dir.display()))?;
      let mut expanded: Vec<PathBuf> = listing
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.join(MANIFEST_FILE).exists())
        .collect();
      expanded.sort();
      dirs.extend(expanded);
    } else {
      dirs.push(root.join(entry));
    }
  }

  Ok(dirs)
}

fn workspaces_from_root_manifest(root: &Path) -> FlotillaResult<Vec<String>> {
  let path = root.join(MANIFEST_FILE);
  if !path.exists() {
    return Ok(vec![]);
  }

  let manifest = read_manifest(root)?;
  Ok(
    manifest
      .get("workspaces")
      .and_then(Value::as_array)
      .map(|entries| {
        entries
          .iter()
          .filter_map(Value::as_str)
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::PackageInfo;
  use serde_json::json;
  use tempfile::TempDir;

  /// Registry fake: `core` is published at 1.0.0, everything else is new
  struct FakeRegistry;

  impl RegistryGateway for FakeRegistry {
    fn fetch_package_info(&self, name: &str) -> FlotillaResult<PackageInfo> {
      if name == "core" {
        Ok(PackageInfo {
          version: Version::new(1, 0, 0),
          artifact: Some("https://registry.example/core-1.0.0.tgz".to_string()),
        })
      } else {
        Ok(PackageInfo::unpublished())
      }
    }

    fn download_artifact(
      &self,
      _reference: &str,
      _dest_dir: &Path,
      _deadline: std::time::Instant,
    ) -> FlotillaResult<PathBuf> {
      unimplemented!("not used by loader tests")
    }

    fn pack(
      &self,
      _package_dir: &Path,
      _dest_dir: &Path,
      _deadline: std::time::Instant,
    ) -> FlotillaResult<PathBuf> {
      unimplemented!("not used by loader tests")
    }

    fn publish(&self, _package_dir: &Path, _tag: &str, _access: AccessLevel) -> FlotillaResult<()> {
      unimplemented!("not used by loader tests")
    }
  }

  fn write_manifest(dir: &Path, content: &Value) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(content).unwrap()).unwrap();
  }

  #[test]
  fn test_load_classifies_internal_and_external() {
    let tmp = TempDir::new().unwrap();
    let core_dir = tmp.path().join("core");
    let app_dir = tmp.path().join("app");
    write_manifest(&core_dir, &json!({ "name": "core", "version": "1.0.0" }));
    write_manifest(
      &app_dir,
      &json!({
        "name": "app",
        "version": "0.1.0",
        "dependencies": { "core": "workspace:*", "left-pad": "^1.3.0" },
        "devDependencies": { "core": "^1.0.0" }
      }),
    );

    let packages = load_packages(
      &[core_dir, app_dir],
      AccessLevel::Public,
      &FakeRegistry,
    )
    .unwrap();

    let app = packages.iter().find(|p| p.name == "app").unwrap();
    let internal: Vec<_> = app.internal_dependencies().collect();
    assert_eq!(internal.len(), 2, "workspace marker and name match are both internal");
    assert!(
      app
        .dependencies
        .iter()
        .any(|d| d.name == "left-pad" && d.kind == DepKind::External)
    );

    let core = packages.iter().find(|p| p.name == "core").unwrap();
    assert_eq!(core.current_version, Version::new(1, 0, 0));
    assert!(core.registry_artifact.is_some());
    assert_eq!(app.current_version, Version::new(0, 0, 0));
  }

  #[test]
  fn test_invalid_specifier_rejects_load() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("bad");
    write_manifest(
      &dir,
      &json!({
        "name": "bad",
        "dependencies": { "helper": "file:../helper" }
      }),
    );

    let err = load_packages(&[dir], AccessLevel::Public, &FakeRegistry).unwrap_err();
    assert!(matches!(
      err,
      FlotillaError::Manifest(ManifestError::InvalidSpecifier { .. })
    ));
  }

  #[test]
  fn test_missing_name_rejects_load() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("anon");
    write_manifest(&dir, &json!({ "version": "1.0.0" }));

    let err = load_packages(&[dir], AccessLevel::Public, &FakeRegistry).unwrap_err();
    assert!(matches!(
      err,
      FlotillaError::Manifest(ManifestError::MissingName { .. })
    ));
  }

  #[test]
  fn test_access_mismatch_rejects_load() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("scoped");
    write_manifest(
      &dir,
      &json!({
        "name": "scoped",
        "publishConfig": { "access": "restricted" }
      }),
    );

    let err = load_packages(&[dir], AccessLevel::Public, &FakeRegistry).unwrap_err();
    assert!(matches!(
      err,
      FlotillaError::Manifest(ManifestError::AccessMismatch { .. })
    ));
  }

  #[test]
  fn test_private_packages_not_eligible() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("internal-tool");
    write_manifest(&dir, &json!({ "name": "internal-tool", "private": true }));

    let packages = load_packages(&[dir], AccessLevel::Public, &FakeRegistry).unwrap();
    assert!(!packages[0].publish_eligible);
  }

  #[test]
  fn test_discover_expands_star_entries() {
    let tmp = TempDir::new().unwrap();
    write_manifest(&tmp.path().join("packages/a"), &json!({ "name": "a" }));
    write_manifest(&tmp.path().join("packages/b"), &json!({ "name": "b" }));
    // Directory without a manifest is skipped
    std::fs::create_dir_all(tmp.path().join("packages/docs")).unwrap();

    let config = FlotillaConfig {
      packages: vec!["packages/*".to_string()],
      ..FlotillaConfig::default()
    };
    let dirs = discover_package_dirs(tmp.path(), &config).unwrap();
    assert_eq!(dirs.len(), 2);
  }

  #[test]
  fn test_discover_falls_back_to_workspaces_then_root() {
    let tmp = TempDir::new().unwrap();
    write_manifest(
      tmp.path(),
      &json!({ "name": "root", "workspaces": ["pkgs/*"] }),
    );
    write_manifest(&tmp.path().join("pkgs/x"), &json!({ "name": "x" }));

    let dirs = discover_package_dirs(tmp.path(), &FlotillaConfig::default()).unwrap();
    assert_eq!(dirs, vec![tmp.path().join("pkgs/x")]);

    // No workspaces and no packages config: root is the single package
    let single = TempDir::new().unwrap();
    write_manifest(single.path(), &json!({ "name": "solo" }));
    let dirs = discover_package_dirs(single.path(), &FlotillaConfig::default()).unwrap();
    assert_eq!(dirs, vec![single.path().to_path_buf()]);
  }
}
