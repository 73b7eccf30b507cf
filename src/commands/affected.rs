//! `flotilla affected` - show which packages a git range touches
//!
//! Maps changed file paths to the packages whose directories contain them,
//! then expands through the dependency graph so indirect dependents are
//! included. Runs fully offline: the registry is never contacted.

use crate::core::context::RunContext;
use crate::core::error::{FlotillaError, FlotillaResult};
use crate::graph::{PackageGraph, expand};
use crate::manifest::{AccessLevel, Package, discover_package_dirs, load_packages};
use crate::registry::{PackageInfo, RegistryGateway};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Output format for affected command
#[derive(Debug, Clone, Copy)]
enum OutputFormat {
  Text,
  Json,
  NamesOnly,
}

impl OutputFormat {
  fn from_str(s: &str) -> FlotillaResult<Self> {
    match s.to_lowercase().as_str() {
      "text" => Ok(Self::Text),
      "json" => Ok(Self::Json),
      "names" | "names-only" => Ok(Self::NamesOnly),
      _ => Err(FlotillaError::message(format!(
        "Unknown format '{}'. Valid formats: text, json, names-only",
        s
      ))),
    }
  }
}

/// Registry stand-in for commands that never need published state
struct OfflineRegistry;

impl RegistryGateway for OfflineRegistry {
  fn fetch_package_info(&self, _name: &str) -> FlotillaResult<PackageInfo> {
    Ok(PackageInfo::unpublished())
  }

  fn download_artifact(&self, reference: &str, _dest_dir: &Path, _deadline: Instant) -> FlotillaResult<PathBuf> {
    Err(FlotillaError::message(format!("offline: cannot download '{}'", reference)))
  }

  fn pack(&self, package_dir: &Path, _dest_dir: &Path, _deadline: Instant) -> FlotillaResult<PathBuf> {
    Err(FlotillaError::message(format!(
      "offline: cannot pack '{}'",
      package_dir.display()
    )))
  }

  fn publish(&self, package_dir: &Path, _tag: &str, _access: AccessLevel) -> FlotillaResult<()> {
    Err(FlotillaError::message(format!(
      "offline: cannot publish '{}'",
      package_dir.display()
    )))
  }
}

pub fn run_affected(
  ctx: &RunContext,
  since: String,
  from: Option<String>,
  to: Option<String>,
  format: String,
) -> FlotillaResult<()> {
  let output_format = OutputFormat::from_str(&format)?;

  let range = match (from, to) {
    (Some(from), Some(to)) => format!("{}..{}", from, to),
    (Some(from), None) => format!("{}..HEAD", from),
    _ => format!("{}..HEAD", since),
  };
  let changed_paths = ctx.vcs.diff_changed_paths(&range)?;

  let dirs = discover_package_dirs(&ctx.root, &ctx.config)?;
  let packages = load_packages(&dirs, AccessLevel::Public, &OfflineRegistry)?;

  let direct = packages_containing(&packages, &changed_paths);
  let graph = PackageGraph::build(&packages);
  let affected = expand(&graph, &direct);

  let mut direct: Vec<String> = direct.into_iter().collect();
  direct.sort();
  let mut dependents: Vec<String> = affected.iter().filter(|n| !direct.contains(n)).cloned().collect();
  dependents.sort();

  match output_format {
    OutputFormat::Text => {
      println!("Changed files: {}", changed_paths.len());
      println!();
      println!("Directly changed packages ({}):", direct.len());
      for name in &direct {
        println!("  {}", name);
      }
      println!();
      println!("Affected dependents ({}):", dependents.len());
      for name in &dependents {
        println!("  {}", name);
      }
    }
    OutputFormat::Json => {
      let value = json!({
        "range": range,
        "changed_files": changed_paths.len(),
        "direct": direct,
        "dependents": dependents,
      });
      println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    }
    OutputFormat::NamesOnly => {
      for name in direct.iter().chain(dependents.iter()) {
        println!("{}", name);
      }
    }
  }

  Ok(())
}

/// Packages whose directory contains at least one changed path.
///
/// Changed paths come from git and are rooted at the resolved repository
/// toplevel, so package directories are resolved the same way before the
/// prefix check; a symlinked or otherwise aliased workspace root must not
/// make every package look untouched.
fn packages_containing(packages: &[Package], paths: &[PathBuf]) -> HashSet<String> {
  packages
    .iter()
    .filter(|pkg| {
      let dir = pkg.path.canonicalize().unwrap_or_else(|_| pkg.path.clone());
      paths.iter().any(|path| path.starts_with(&dir))
    })
    .map(|pkg| pkg.name.clone())
    .collect()
}
