//! Package manifests: data model, specifier parsing, loading
//!
//! A `Package` is one publishable unit, owned exclusively by the run that
//! loaded it. It is mutated in place as versions are computed and internal
//! dependency specifiers rewritten, then discarded at end of run.

pub mod loader;
pub mod specifier;

pub use loader::{discover_package_dirs, load_packages};
pub use specifier::Specifier;

use crate::core::error::{FlotillaResult, ResultExt};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const MANIFEST_FILE: &str = "package.json";

/// Registry visibility for a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
  Public,
  Restricted,
}

impl AccessLevel {
  pub fn parse(s: &str) -> Option<Self> {
    match s.to_lowercase().as_str() {
      "public" => Some(AccessLevel::Public),
      "restricted" => Some(AccessLevel::Restricted),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      AccessLevel::Public => "public",
      AccessLevel::Restricted => "restricted",
    }
  }
}

impl std::fmt::Display for AccessLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Whether a dependency targets a same-repo package or the wider registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
  Internal,
  External,
}

/// Manifest section a dependency was declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepCategory {
  Runtime,
  Development,
  Peer,
}

impl DepCategory {
  pub const ALL: [DepCategory; 3] = [DepCategory::Runtime, DepCategory::Development, DepCategory::Peer];

  pub fn manifest_key(&self) -> &'static str {
    match self {
      DepCategory::Runtime => "dependencies",
      DepCategory::Development => "devDependencies",
      DepCategory::Peer => "peerDependencies",
    }
  }
}

/// One declared dependency reference
#[derive(Debug, Clone)]
pub struct Dependency {
  pub name: String,
  pub kind: DepKind,
  pub specifier: Specifier,
  pub category: DepCategory,
}

/// One publishable unit
#[derive(Debug, Clone)]
pub struct Package {
  pub name: String,
  /// Directory holding the manifest and build output
  pub path: PathBuf,
  /// Last known published version; `0.0.0` if never published
  pub current_version: Version,
  /// Reference to the last published artifact, absent if never published
  pub registry_artifact: Option<String>,
  pub access: AccessLevel,
  /// False for manifests marked `"private": true`
  pub publish_eligible: bool,
  pub dependencies: Vec<Dependency>,
  /// Raw manifest document, rewritten in place before publish
  pub manifest: Map<String, Value>,
}

impl Package {
  pub fn manifest_path(&self) -> PathBuf {
    self.path.join(MANIFEST_FILE)
  }

  pub fn internal_dependencies(&self) -> impl Iterator<Item = &Dependency> {
    self.dependencies.iter().filter(|d| d.kind == DepKind::Internal)
  }

  /// Record the computed version in the manifest document
  pub fn set_version(&mut self, version: &Version) {
    self
      .manifest
      .insert("version".to_string(), Value::String(version.to_string()));
  }

  /// Rewrite one dependency entry in its manifest section
  pub fn set_dependency_specifier(&mut self, category: DepCategory, name: &str, spec: &str) {
    if let Some(Value::Object(deps)) = self.manifest.get_mut(category.manifest_key())
      && deps.contains_key(name)
    {
      deps.insert(name.to_string(), Value::String(spec.to_string()));
    }
  }

  /// Persist the (rewritten) manifest back to disk
  pub fn write_manifest(&self) -> FlotillaResult<()> {
    let rendered = serde_json::to_string_pretty(&Value::Object(self.manifest.clone()))?;
    std::fs::write(self.manifest_path(), rendered + "\n")
      .with_context(|| format!("failed to write {}", self.manifest_path().display()))
  }
}
